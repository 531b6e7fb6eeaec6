use anyhow::Result;
use futures::future::BoxFuture;

use super::types::CheckResult;

/// Callback invoked with each finished result. The loop awaits the
/// callback before its inter-iteration wait, so at most one result per
/// check is ever in flight.
pub type ResultCallback = Box<dyn Fn(CheckResult) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A periodic probe that owns its own execution loop.
///
/// `start` does not return normally: it loops until the owning task is
/// cancelled, which abandons the in-progress iteration without emitting a
/// result. A callback error (a bus publish failure) propagates out as the
/// loop's error.
#[async_trait::async_trait]
pub trait Check: Send + Sync {
    /// Serialized configuration, persisted when the check is registered.
    fn config_document(&self) -> Result<serde_json::Value>;

    /// Run the probe loop, delivering exactly one result per iteration.
    async fn start(&self, callback: ResultCallback) -> Result<()>;
}
