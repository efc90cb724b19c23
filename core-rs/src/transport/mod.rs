//! Transport module for the bulk summary endpoint
//!
//! Provides the SummaryTransport trait (one "resolve batch" operation),
//! the wire types it returns, and HttpTransport over reqwest.

mod traits;
mod http;
pub mod wire;

pub use traits::SummaryTransport;
pub use http::HttpTransport;
pub use wire::{FieldDescriptor, InstanceType, SummaryEntry, SummaryError, SummaryFields, SummaryResponse, SummarySlot};
