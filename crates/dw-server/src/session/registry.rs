//! Live session registry and admission control

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dw_core::error::SessionError;
use dw_core::types::{SessionId, SessionState};

use super::handle::{Outbound, Session};

/// Owns the set of live sessions and enforces the node cap
pub struct SessionRegistry {
    /// Sessions indexed by node ID
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Monotonic node ID allocator
    next_id: AtomicU32,
    /// Configured maximum concurrent sessions
    max_sessions: usize,
    /// Serializes the capacity check against the insert, so the cap is
    /// never overshot by concurrent accepts
    admission: Mutex<()>,
}

impl SessionRegistry {
    /// Create an empty registry with the given node cap
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU32::new(1),
            max_sessions,
            admission: Mutex::new(()),
        }
    }

    /// Admit a new connection, or refuse it if every node is taken.
    ///
    /// A refused connection is never registered; the caller owes the peer a
    /// polite capacity notice before closing the socket.
    pub fn admit(
        &self,
        peer: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
        cancel: CancellationToken,
    ) -> Result<Arc<Session>, SessionError> {
        let _guard = self.admission.lock().expect("admission lock poisoned");

        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::LimitExceeded {
                max: self.max_sessions,
            });
        }

        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session::new(id, peer, outbound, cancel));
        self.sessions.insert(id, Arc::clone(&session));

        tracing::info!("Admitted {} from {} ({} nodes in use)", id, peer, self.len());
        Ok(session)
    }

    /// Remove a session from the registry
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, s)| s)
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| Arc::clone(&r))
    }

    /// List all sessions
    pub fn list(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The configured node cap
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}

/// Broadcast a shutdown notice, allow in-flight output to flush, then
/// force-close whatever remains.
///
/// Cancelling a session's token also cancels any door it owns.
pub async fn shutdown_all(registry: &SessionRegistry, grace: Duration) {
    let sessions = registry.list();
    if sessions.is_empty() {
        return;
    }

    tracing::info!("Shutting down {} active sessions", sessions.len());
    for session in &sessions {
        if session.state() == SessionState::Active {
            session.try_send_data(Bytes::from_static(
                b"\r\nThe system is going down for maintenance. Goodbye!\r\n",
            ));
        }
        session.try_close();
        session.request_close();
    }

    tokio::time::sleep(grace).await;

    for session in &sessions {
        session.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit_one(registry: &SessionRegistry) -> Result<Arc<Session>, SessionError> {
        // The writer end is never drained in these tests; sends degrade to
        // silent no-ops once the receiver is gone, which is fine here.
        let (tx, _rx) = mpsc::channel(8);
        registry.admit(
            "127.0.0.1:4000".parse().unwrap(),
            tx,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_capacity_enforced() {
        let registry = SessionRegistry::new(2);

        let a = admit_one(&registry).unwrap();
        let _b = admit_one(&registry).unwrap();
        assert_eq!(registry.len(), 2);

        // The third caller is refused and never registered
        let refused = admit_one(&registry);
        assert!(matches!(
            refused,
            Err(SessionError::LimitExceeded { max: 2 })
        ));
        assert_eq!(registry.len(), 2);

        // Freeing a node lets the next caller in
        registry.remove(a.id);
        assert!(admit_one(&registry).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = SessionRegistry::new(8);
        let a = admit_one(&registry).unwrap();
        let b = admit_one(&registry).unwrap();
        registry.remove(a.id);
        let c = admit_one(&registry).unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything() {
        let registry = SessionRegistry::new(4);
        let a = admit_one(&registry).unwrap();
        let b = admit_one(&registry).unwrap();
        a.activate();

        shutdown_all(&registry, Duration::from_millis(10)).await;

        assert!(a.cancel.is_cancelled());
        assert!(b.cancel.is_cancelled());
        assert_eq!(a.state(), SessionState::Closing);
    }
}
