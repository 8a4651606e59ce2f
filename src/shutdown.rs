//! Shutdown signalling.
//!
//! One `watch::channel(false)` per service carries the stop request; every
//! long-running loop selects on [`stopped`] next to its real work.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::watch;
use tracing::{info, warn};

// ============================================================================
// Stop Channel
// ============================================================================

/// Creates a stop channel in the running state.
#[inline]
#[must_use]
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once a stop is requested or the sender is gone.
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|&stop| stop).await;
}

// ============================================================================
// OS Signals
// ============================================================================

/// Waits for Ctrl+C, or SIGTERM on unix.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl+C received"),
        () = terminate => info!("SIGTERM received"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    #[tokio::test]
    async fn test_stopped_waits_for_request() {
        let (tx, mut rx) = channel();

        assert!(
            timeout(Duration::from_millis(20), stopped(&mut rx))
                .await
                .is_err()
        );

        tx.send_replace(true);
        timeout(Duration::from_secs(1), stopped(&mut rx))
            .await
            .expect("stop observed");
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_stop() {
        let (tx, mut rx) = channel();
        drop(tx);
        timeout(Duration::from_secs(1), stopped(&mut rx))
            .await
            .expect("stop observed");
    }
}
