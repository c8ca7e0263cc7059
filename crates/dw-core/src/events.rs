//! Lifecycle event channel to collaborator sinks
//!
//! Statistics and dashboard collaborators observe the core through explicit
//! message passing rather than callbacks: the core emits `NodeEvent`s into
//! an mpsc channel and never blocks on a slow consumer.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::types::{DoorOutcome, SessionId};

/// Events the core exposes to its collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A caller connected and completed negotiation
    SessionConnected {
        session: SessionId,
        peer: String,
    },

    /// A session fully closed
    SessionDisconnected {
        session: SessionId,
        duration: Duration,
    },

    /// A door process reached Running
    DoorStarted {
        session: SessionId,
        door: String,
    },

    /// A door session reached a terminal state
    DoorEnded {
        session: SessionId,
        door: String,
        outcome: DoorOutcome,
        duration: Duration,
    },
}

/// Sending half of the event channel, cheap to clone
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<NodeEvent>,
}

impl EventBus {
    /// Create a bus and its consumer end
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NodeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit an event without blocking.
    ///
    /// A full channel drops the event with a warning; a closed channel is
    /// silent (no collaborator is listening, which is a valid deployment).
    pub fn emit(&self, event: NodeEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("Event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
