/**
 * config module
 * Resolver configuration (service endpoint and batching policy)
 */

pub mod resolver;

pub use resolver::{ApiConfig, QueueConfig, ResolverConfig, ResolverSpec, DEFAULT_SUMMARY_PATH};
