//! Deadline wrapper for collaborator calls.

use std::future::Future;
use std::time::Duration;

/// Run `fut` under `timeout`, flattening both failure modes to a message.
pub(crate) async fn within<T, F>(timeout: Duration, fut: F) -> Result<T, String>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(_) => Err(format!("timed out after {timeout:?}")),
    }
}
