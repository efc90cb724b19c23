//! Transport abstraction for the bulk summary endpoint

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::Result;
use crate::transport::wire::SummaryResponse;

/// Outbound "resolve batch" operation
///
/// Implementations send every id of the batch in one request. Per-id
/// failures belong in the returned [`SummaryResponse`]; an `Err` means the
/// whole request failed and every id of the batch is marked as errored.
#[async_trait]
pub trait SummaryTransport: Send + Sync {
    async fn resolve_batch(&self, ids: &[String]) -> Result<SummaryResponse>;
}

#[async_trait]
impl<T: SummaryTransport + ?Sized> SummaryTransport for Arc<T> {
    async fn resolve_batch(&self, ids: &[String]) -> Result<SummaryResponse> {
        (**self).resolve_batch(ids).await
    }
}
