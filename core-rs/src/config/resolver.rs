/**
 * resolver.rs
 * Parser for resolver configuration files (YAML format)
 *
 * Format:
 * ```yaml
 * apiVersion: kg-labels/v1
 * kind: Resolver
 * spec:
 *   api:
 *     baseUrl: https://kg.example.org
 *     summaryPath: /editor/api/instancesBulk/summary
 *     authToken: optional-bearer-token
 *     timeoutSecs: 30
 *   queue:
 *     debounceMs: 250
 *     highWaterMark: 5000
 *     batchSize: 5000
 * ```
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::ResolverError;

pub const API_VERSION: &str = "kg-labels/v1";
pub const KIND: &str = "Resolver";

/// Default path of the bulk summary endpoint on the KG editor service
pub const DEFAULT_SUMMARY_PATH: &str = "/editor/api/instancesBulk/summary";

/// Resolver configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    pub api_version: String,
    pub kind: String,
    pub spec: ResolverSpec,
}

/// Resolver specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverSpec {
    pub api: ApiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Remote KG service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_summary_path")]
    pub summary_path: String,
    /// Bearer token sent with every request. Obtaining it is up to the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Batching policy of the label resolution queue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Debounce window before a pending batch is sent
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Pending-set size at which the debounce is bypassed
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
    /// Maximum ids per summary request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_summary_path() -> String {
    DEFAULT_SUMMARY_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_high_water_mark() -> usize {
    5000
}

fn default_batch_size() -> usize {
    5000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            high_water_mark: default_high_water_mark(),
            batch_size: default_batch_size(),
        }
    }
}

impl QueueConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<(), ResolverError> {
        if self.high_water_mark == 0 {
            return Err(ResolverError::ValidationError(
                "spec.queue.highWaterMark must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ResolverError::ValidationError(
                "spec.queue.batchSize must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ResolverConfig {
    /// Load a resolver config from the specified path
    ///
    /// # Example
    /// ```no_run
    /// use kg_labels::config::ResolverConfig;
    ///
    /// let config = ResolverConfig::load("resolver.yaml").unwrap();
    /// println!("{}", config.spec.api.base_url);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ResolverError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ResolverError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let content = fs::read_to_string(path)?;

        let config: ResolverConfig = serde_yaml::from_str(&content).map_err(|e| {
            ResolverError::ParseError(format!("Invalid resolver YAML: {}", e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Validate config structure
    ///
    /// Ensures:
    /// - apiVersion is "kg-labels/v1"
    /// - kind is "Resolver"
    /// - baseUrl is an http(s) URL and summaryPath starts with '/'
    /// - queue thresholds are positive
    pub fn validate(&self) -> Result<(), ResolverError> {
        if self.api_version != API_VERSION {
            return Err(ResolverError::ValidationError(format!(
                "Invalid apiVersion: expected '{}', got '{}'",
                API_VERSION, self.api_version
            )));
        }

        if self.kind != KIND {
            return Err(ResolverError::ValidationError(format!(
                "Invalid kind: expected '{}', got '{}'",
                KIND, self.kind
            )));
        }

        let base_url = &self.spec.api.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ResolverError::ValidationError(format!(
                "spec.api.baseUrl must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        if !self.spec.api.summary_path.starts_with('/') {
            return Err(ResolverError::ValidationError(
                "spec.api.summaryPath must start with '/'".to_string(),
            ));
        }

        self.spec.queue.validate()
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ResolverError> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), yaml)?;
        Ok(())
    }

    /// Create a config pointing at `base_url` with default queue settings
    pub fn new(base_url: String) -> Self {
        ResolverConfig {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            spec: ResolverSpec {
                api: ApiConfig {
                    base_url,
                    summary_path: default_summary_path(),
                    auth_token: None,
                    timeout_secs: default_timeout_secs(),
                },
                queue: QueueConfig::default(),
            },
        }
    }
}
