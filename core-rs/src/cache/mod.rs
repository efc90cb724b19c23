//! Cache module for referenced KG instances
//!
//! Holds the shared record store the resolution queue writes into and the
//! UI layer reads from.

pub mod instance_cache;

pub use instance_cache::{InstanceCache, InstanceRecord, RecordEvent, ResolutionState, NAME_FIELD, NAME_FIELD_LABEL};
