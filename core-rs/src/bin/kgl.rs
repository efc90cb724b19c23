//! KGL - KG label resolver CLI
//!
//! Resolves display labels for instance ids through the bulk summary endpoint

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use kg_labels::{
    HttpTransport, InstanceCache, InstanceRecord, ResolutionQueue, ResolutionState, ResolverConfig,
};

#[derive(Parser)]
#[command(name = "kgl")]
#[command(version)]
#[command(about = "Resolve knowledge-graph instance labels in batches", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve labels for instance ids
    Resolve {
        /// Resolver config file (YAML)
        #[arg(long, short)]
        config: PathBuf,
        /// Read additional ids from a file, one per line
        #[arg(long)]
        from_file: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Instance ids
        ids: Vec<String>,
    },
    /// Validate a resolver config file
    CheckConfig {
        /// Resolver config file (YAML)
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve {
            config,
            from_file,
            format,
            ids,
        } => handle_resolve(config, from_file, format, ids).await,
        Commands::CheckConfig { config } => handle_check_config(config),
    }
}

async fn handle_resolve(
    config_path: PathBuf,
    from_file: Option<PathBuf>,
    format: OutputFormat,
    mut ids: Vec<String>,
) -> anyhow::Result<()> {
    let config = ResolverConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if let Some(path) = from_file {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading ids from {}", path.display()))?;
        ids.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    if ids.is_empty() {
        bail!("no instance ids given");
    }

    let transport = HttpTransport::from_config(&config.spec.api)?;
    let cache = Arc::new(InstanceCache::new());
    let queue = ResolutionQueue::new(cache.clone(), Arc::new(transport), config.spec.queue);

    tracing::info!(
        count = ids.len(),
        endpoint = %config.spec.api.base_url,
        "resolving instance labels"
    );

    for id in &ids {
        queue.request_resolution(id)?;
    }
    queue.flush_now().await;

    let mut seen = std::collections::HashSet::new();
    let records: Vec<InstanceRecord> = ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| cache.get(id))
        .collect();

    match format {
        OutputFormat::Table => print_records_table(&records),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
    }

    let failed = records
        .iter()
        .filter(|record| record.state() == ResolutionState::Errored)
        .count();
    if failed > 0 {
        bail!("{} of {} instances failed to resolve", failed, records.len());
    }

    Ok(())
}

fn handle_check_config(config_path: PathBuf) -> anyhow::Result<()> {
    let config = ResolverConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    println!("✓ {} is valid", config_path.display());
    println!("  Endpoint:        {}{}", config.spec.api.base_url, config.spec.api.summary_path);
    println!("  Auth token:      {}", if config.spec.api.auth_token.is_some() { "set" } else { "none" });
    println!("  Debounce:        {} ms", config.spec.queue.debounce_ms);
    println!("  High-water mark: {}", config.spec.queue.high_water_mark);
    println!("  Batch size:      {}", config.spec.queue.batch_size);

    Ok(())
}

fn print_records_table(records: &[InstanceRecord]) {
    println!("\n{:<40} {:<10} {:<32} {:<24}", "ID", "STATUS", "NAME", "TYPES");
    println!("{}", "-".repeat(108));

    for record in records {
        let status = match record.state() {
            ResolutionState::Resolved => "OK",
            ResolutionState::Errored => "ERROR",
            ResolutionState::Fetching => "FETCHING",
            ResolutionState::Unresolved => "PENDING",
        };

        let detail = match &record.fetch_error {
            Some(error) => error.clone(),
            None => record.label().to_string(),
        };

        let types = record
            .types
            .iter()
            .map(|t| t.label.clone().unwrap_or_else(|| t.name.clone()))
            .collect::<Vec<_>>()
            .join(", ");

        println!("{:<40} {:<10} {:<32} {:<24}", record.id, status, detail, types);
    }

    println!();
}
