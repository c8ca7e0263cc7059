//! Per-connection session handle
//!
//! A `Session` is the shared handle for one caller: its state machine,
//! activity stamp, negotiated terminal, user profile, ordered outbound
//! channel, and the one-door-at-a-time slot. The handle is owned by the
//! registry and shared with the connection task, the idle sweep, and any
//! door supervisor it spawns.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dw_core::error::{LaunchError, SessionError};
use dw_core::time::{current_time_millis, elapsed_duration, elapsed_millis};
use dw_core::types::{LaunchId, SessionId, SessionState, UserProfile};
use dw_protocol::{TelnetFrame, TerminalProfile, TerminalSize};

/// One unit of outbound traffic; a single writer task per connection
/// drains these in order, so output writes never interleave.
#[derive(Debug)]
pub enum Outbound {
    /// Application data, IAC-stuffed by the codec
    Data(Bytes),
    /// A raw protocol frame (negotiation replies)
    Frame(TelnetFrame),
    /// Flush and close the connection
    Close,
}

const STATE_NEGOTIATING: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_CLOSING: u8 = 2;
const STATE_CLOSED: u8 = 3;

fn decode_state(raw: u8) -> SessionState {
    match raw {
        STATE_NEGOTIATING => SessionState::Negotiating,
        STATE_ACTIVE => SessionState::Active,
        STATE_CLOSING => SessionState::Closing,
        _ => SessionState::Closed,
    }
}

/// Handle to one live session
pub struct Session {
    /// Node identifier
    pub id: SessionId,
    /// Remote peer address
    pub peer: SocketAddr,
    /// Cancelled when the session must tear down; cancels any owned door
    pub cancel: CancellationToken,

    state: AtomicU8,
    created_at: u64,
    last_activity: AtomicU64,
    terminal: RwLock<TerminalProfile>,
    user: RwLock<Option<UserProfile>>,
    outbound: mpsc::Sender<Outbound>,
    active_door: Mutex<Option<LaunchId>>,
}

impl Session {
    /// Create a session in the Negotiating state
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
        cancel: CancellationToken,
    ) -> Self {
        let now = current_time_millis();
        Self {
            id,
            peer,
            cancel,
            state: AtomicU8::new(STATE_NEGOTIATING),
            created_at: now,
            last_activity: AtomicU64::new(now),
            terminal: RwLock::new(TerminalProfile::default()),
            user: RwLock::new(None),
            outbound,
            active_door: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        decode_state(self.state.load(Ordering::Acquire))
    }

    /// Negotiating → Active, once negotiation has settled
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_NEGOTIATING,
                STATE_ACTIVE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Claim the transition into Closing.
    ///
    /// Returns true for exactly one caller; the sweep, the connection task
    /// and shutdown all race through here so teardown runs once.
    pub fn try_close(&self) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current >= STATE_CLOSING {
                return false;
            }
            if self
                .state
                .compare_exchange(current, STATE_CLOSING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Final transition once resources are released
    pub fn mark_closed(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
    }

    /// Stamp activity now
    pub fn touch(&self) {
        self.last_activity
            .store(current_time_millis(), Ordering::Release);
    }

    /// Milliseconds since the last activity stamp
    pub fn idle_millis(&self) -> u64 {
        elapsed_millis(self.last_activity.load(Ordering::Acquire))
    }

    /// Wall-clock age of the session
    pub fn session_duration(&self) -> Duration {
        elapsed_duration(self.created_at)
    }

    /// Queue application data for the caller, in order
    pub async fn send_data(&self, data: Bytes) -> Result<(), SessionError> {
        self.outbound
            .send(Outbound::Data(data))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Queue a raw protocol frame
    pub async fn send_frame(&self, frame: TelnetFrame) -> Result<(), SessionError> {
        self.outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Best-effort data send for paths that must not block (idle sweep,
    /// shutdown broadcast)
    pub fn try_send_data(&self, data: Bytes) {
        let _ = self.outbound.try_send(Outbound::Data(data));
    }

    /// Ask the writer task to flush and close the connection
    pub fn request_close(&self) {
        let _ = self.outbound.try_send(Outbound::Close);
    }

    /// Negotiated terminal parameters
    pub fn terminal(&self) -> TerminalProfile {
        self.terminal.read().expect("terminal lock poisoned").clone()
    }

    /// Store the negotiation result
    pub fn set_terminal(&self, profile: TerminalProfile) {
        *self.terminal.write().expect("terminal lock poisoned") = profile;
    }

    /// Apply a window-size change report
    pub fn set_size(&self, size: TerminalSize) {
        self.terminal.write().expect("terminal lock poisoned").size = size;
    }

    /// The authenticated (or guest) profile, if one is bound yet
    pub fn user(&self) -> Option<UserProfile> {
        self.user.read().expect("user lock poisoned").clone()
    }

    /// Bind a user profile to the session
    pub fn set_user(&self, profile: UserProfile) {
        *self.user.write().expect("user lock poisoned") = Some(profile);
    }

    /// Claim the session's single door slot.
    ///
    /// At most one door may be Starting/Running per session.
    pub fn begin_door(&self, launch: LaunchId) -> Result<(), LaunchError> {
        let mut slot = self.active_door.lock().expect("door slot poisoned");
        if slot.is_some() {
            return Err(LaunchError::DoorBusy);
        }
        *slot = Some(launch);
        Ok(())
    }

    /// Release the door slot; only the owning launch may release it
    pub fn end_door(&self, launch: LaunchId) {
        let mut slot = self.active_door.lock().expect("door slot poisoned");
        if *slot == Some(launch) {
            *slot = None;
        }
    }

    /// The launch currently occupying the door slot
    pub fn active_door(&self) -> Option<LaunchId> {
        *self.active_door.lock().expect("door slot poisoned")
    }

    #[cfg(test)]
    pub(crate) fn backdate_activity(&self, millis_ago: u64) {
        self.last_activity.store(
            current_time_millis().saturating_sub(millis_ago),
            Ordering::Release,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> (Session, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        let session = Session::new(
            SessionId::new(1),
            "127.0.0.1:4000".parse().unwrap(),
            tx,
            CancellationToken::new(),
        );
        (session, rx)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (session, _rx) = test_session();
        assert_eq!(session.state(), SessionState::Negotiating);

        assert!(session.activate());
        assert_eq!(session.state(), SessionState::Active);
        // Activate is one-shot
        assert!(!session.activate());

        assert!(session.try_close());
        assert_eq!(session.state(), SessionState::Closing);
        // Only one caller wins the close
        assert!(!session.try_close());

        session.mark_closed();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.try_close());
    }

    #[test]
    fn test_close_from_negotiating() {
        let (session, _rx) = test_session();
        assert!(session.try_close());
        assert_eq!(session.state(), SessionState::Closing);
        assert!(!session.activate());
    }

    #[test]
    fn test_door_slot_is_exclusive() {
        let (session, _rx) = test_session();
        session.begin_door(LaunchId::new(1)).unwrap();
        assert!(matches!(
            session.begin_door(LaunchId::new(2)),
            Err(LaunchError::DoorBusy)
        ));

        // A stranger cannot release the slot
        session.end_door(LaunchId::new(2));
        assert_eq!(session.active_door(), Some(LaunchId::new(1)));

        session.end_door(LaunchId::new(1));
        assert!(session.active_door().is_none());
        session.begin_door(LaunchId::new(3)).unwrap();
    }

    #[test]
    fn test_touch_resets_idle() {
        let (session, _rx) = test_session();
        session.backdate_activity(5_000);
        assert!(session.idle_millis() >= 5_000);
        session.touch();
        assert!(session.idle_millis() < 1_000);
    }
}
