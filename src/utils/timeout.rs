use crate::error::{NemoriaError, Result};
use std::future::Future;
use std::time::Duration;

/// Default timeout for connects and single writes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time a client gets to finish the handshake
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Time a connection may stay silent between requests
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Time a client waits for one response
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Time the server waits for open connections on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut` with a deadline, mapping expiry to [`NemoriaError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(NemoriaError::Timeout),
    }
}
