// src/ingest/types.rs
use anyhow::Result;

use crate::notice::Notice;

/// An upstream NOTAM feed. Implementations return notices most-recent
/// first when the upstream supports ordering; the poller only depends on
/// this contract.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, airport_code: &str) -> Result<Vec<Notice>>;
    fn name(&self) -> &'static str;
}
