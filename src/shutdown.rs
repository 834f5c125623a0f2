//! Graceful shutdown coordinator.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels a [`CancellationToken`]: the
//! concurrency gate stops admitting new downloads/uploads while admitted ones
//! finish. A second signal force-exits.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Exit status used when the user insists on stopping immediately.
pub(crate) const FORCE_EXIT_CODE: i32 = 130;

pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut unix_signals = {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                (Ok(term), Ok(hup)) => Some((term, hup)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("Could not register SIGTERM/SIGHUP handlers: {}", e);
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            let received = match unix_signals.as_mut() {
                Some((term, hup)) => tokio::select! {
                    r = tokio::signal::ctrl_c() => r.is_ok(),
                    _ = term.recv() => true,
                    _ = hup.recv() => true,
                },
                None => tokio::signal::ctrl_c().await.is_ok(),
            };

            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await.is_ok();

            if !received {
                tracing::warn!("Signal listener failed; Ctrl+C will not stop the sync gracefully");
                return;
            }

            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                tracing::info!("Received shutdown signal, letting in-flight transfers finish...");
                tracing::info!("Press Ctrl+C again to force exit");
                handler_token.cancel();
            } else {
                tracing::warn!("Force exit requested");
                std::process::exit(FORCE_EXIT_CODE);
            }
        }
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Signal delivery can't be safely tested in a shared test binary.
    #[tokio::test]
    async fn install_returns_live_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn child_tokens_observe_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
