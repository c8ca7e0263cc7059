//! Idle session sweep
//!
//! A background task walks the registry on a fixed interval and closes any
//! session whose last-activity stamp is older than the configured idle
//! timeout. Closing here means winning the `try_close()` race and
//! cancelling the session's token; the connection task owns the actual
//! teardown, so the sweep itself never blocks on session I/O.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::registry::SessionRegistry;

/// Run the idle sweep until cancelled
pub async fn run_idle_sweep(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    sweep_interval: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(sweep_interval);

    tracing::info!(
        "Starting idle sweep (timeout: {:?}, interval: {:?})",
        idle_timeout,
        sweep_interval
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_idle_sessions(&registry, idle_timeout);
            }
            _ = cancel.cancelled() => {
                tracing::info!("Idle sweep shutting down");
                break;
            }
        }
    }
}

/// One sweep pass; returns how many sessions were closed
pub fn sweep_idle_sessions(registry: &SessionRegistry, idle_timeout: Duration) -> usize {
    let cutoff = idle_timeout.as_millis() as u64;
    let mut closed = 0;

    for session in registry.list() {
        if session.idle_millis() < cutoff {
            continue;
        }
        // try_close() ensures exactly one closer wins against disconnect
        // and shutdown
        if session.try_close() {
            tracing::info!(
                "Closing {} after {}s idle",
                session.id,
                session.idle_millis() / 1000
            );
            session.try_send_data(Bytes::from_static(
                b"\r\nYou have been idle too long. Goodbye!\r\n",
            ));
            session.request_close();
            session.cancel.cancel();
            closed += 1;
        }
    }

    if closed > 0 {
        tracing::info!("Idle sweep closed {} sessions", closed);
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use dw_core::types::SessionState;
    use tokio::sync::mpsc;

    fn registry_with_sessions(n: usize) -> (SessionRegistry, Vec<Arc<super::super::Session>>) {
        let registry = SessionRegistry::new(8);
        let mut sessions = Vec::new();
        for _ in 0..n {
            let (tx, _rx) = mpsc::channel(8);
            let s = registry
                .admit("127.0.0.1:4000".parse().unwrap(), tx, CancellationToken::new())
                .unwrap();
            s.activate();
            sessions.push(s);
        }
        (registry, sessions)
    }

    #[test]
    fn test_idle_session_is_closed() {
        let (registry, sessions) = registry_with_sessions(2);
        sessions[0].backdate_activity(120_000);

        let closed = sweep_idle_sessions(&registry, Duration::from_secs(60));
        assert_eq!(closed, 1);
        assert_eq!(sessions[0].state(), SessionState::Closing);
        assert!(sessions[0].cancel.is_cancelled());

        // The busy session is untouched
        assert_eq!(sessions[1].state(), SessionState::Active);
        assert!(!sessions[1].cancel.is_cancelled());
    }

    #[test]
    fn test_active_session_survives_sweep() {
        let (registry, sessions) = registry_with_sessions(1);
        sessions[0].touch();
        assert_eq!(sweep_idle_sessions(&registry, Duration::from_secs(60)), 0);
        assert_eq!(sessions[0].state(), SessionState::Active);
    }

    #[test]
    fn test_sweep_does_not_double_close() {
        let (registry, sessions) = registry_with_sessions(1);
        sessions[0].backdate_activity(120_000);

        assert_eq!(sweep_idle_sessions(&registry, Duration::from_secs(60)), 1);
        // Second pass finds it already Closing
        assert_eq!(sweep_idle_sessions(&registry, Duration::from_secs(60)), 0);
    }
}
