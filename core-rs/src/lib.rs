//! # KG Labels - batched label resolution for knowledge-graph instances
//!
//! Views of a knowledge-graph editor reference other instances by id: link
//! chips, dropdown rows, table rows. Each of them needs a display label, and
//! they tend to ask for it all at once. This crate collects those requests
//! and resolves them through a bulk summary endpoint in a few bounded calls.
//!
//! ## Architecture
//!
//! ```text
//!   request_resolution(id)      flush_now()
//!            │                      │
//!            ▼                      ▼
//!   ┌──────────────────────────────────────┐
//!   │          ResolutionQueue             │
//!   │  pending ─debounce/high-water─► batch│
//!   └──────────────────┬───────────────────┘
//!                      │ resolve_batch(ids)
//!                      ▼
//!             SummaryTransport (HTTP)
//!                      │
//!                      ▼
//!   ┌──────────────────────────────────────┐
//!   │   InstanceCache (records by id)      │──► subscribe() / get()
//!   └──────────────────────────────────────┘
//! ```

pub mod errors;
pub mod config;
pub mod cache;
pub mod transport;
pub mod queue;
pub mod table;

pub use errors::{ResolverError, Result};
pub use config::{ApiConfig, QueueConfig, ResolverConfig};
pub use cache::{InstanceCache, InstanceRecord, RecordEvent, ResolutionState, NAME_FIELD};
pub use transport::{FieldDescriptor, HttpTransport, InstanceType, SummaryEntry, SummaryResponse, SummaryTransport};
pub use queue::{ManualTimer, QueuePhase, ResolutionQueue, Timer, TokioTimer};
pub use table::{Column, LinkTable, Row};

/// Version of the resolver config format
pub const CONFIG_API_VERSION: &str = config::resolver::API_VERSION;
