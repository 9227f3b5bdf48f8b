//! Remote reconciliation hook run after the queue drains.

use async_trait::async_trait;

use crate::Result;

/// Pulls remote changes into local state after local mutations were pushed.
///
/// Errors returned here fail the whole sync pass.
#[async_trait]
pub trait RemoteChangePuller: Send + Sync {
    async fn pull_changes(&self) -> Result<()>;
}

/// Puller used until a reconciliation component is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPuller;

#[async_trait]
impl RemoteChangePuller for NoopPuller {
    async fn pull_changes(&self) -> Result<()> {
        tracing::debug!("No remote change puller configured");
        Ok(())
    }
}
