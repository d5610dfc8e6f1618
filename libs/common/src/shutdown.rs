//! Graceful shutdown utilities

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for a shutdown signal (Ctrl+C, or SIGTERM on Unix)
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(mut sig) = term_signal {
                    sig.recv().await;
                } else {
                    std::future::pending::<()>().await
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` once a shutdown signal arrives
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                token.cancel();
            },
            _ = token.cancelled() => {},
        }
    })
}

/// Run a shutdown step, giving up after `limit`
///
/// Returns false when the step timed out.
pub async fn bounded<F>(label: &str, limit: Duration, step: F) -> bool
where
    F: Future<Output = ()>,
{
    match tokio::time::timeout(limit, step).await {
        Ok(()) => true,
        Err(_) => {
            warn!("{} did not finish within {:?}", label, limit);
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let finished = bounded("slow step", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .await;
        assert!(!finished);

        assert!(bounded("fast step", Duration::from_secs(1), async {}).await);
    }

    #[tokio::test]
    async fn test_listener_exits_on_cancel() {
        let token = CancellationToken::new();
        let handle = cancel_on_signal(token.clone());
        token.cancel();
        assert!(handle.await.is_ok());
    }
}
