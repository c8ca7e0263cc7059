//! Core domain types

use std::fmt;

/// Unique identifier for a connected node (one caller's session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u32> for SessionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Unique identifier for one door launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchId(pub u32);

impl LaunchId {
    /// Create a new launch ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LaunchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "launch-{}", self.0)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Option handshake in progress
    Negotiating,
    /// Negotiated and serving the caller
    Active,
    /// Teardown started (disconnect, idle sweep, or shutdown)
    Closing,
    /// Fully torn down
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// The profile the core consumes from the user-directory collaborator.
///
/// Only the fields needed for drop-file substitution and access checks
/// live here; account storage proper is outside the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// BBS handle (alias)
    pub handle: String,
    /// Real name as stored by the directory
    pub real_name: String,
    /// "City, State" style location
    pub location: String,
    /// Access level, 0..=255
    pub security_level: u8,
    /// Minutes left in today's allowance
    pub time_remaining: u32,
}

impl UserProfile {
    /// A minimal guest profile for handles the directory does not know
    pub fn guest(handle: impl Into<String>) -> Self {
        let handle = handle.into();
        Self {
            real_name: handle.clone(),
            handle,
            location: "Unknown".to_string(),
            security_level: 10,
            time_remaining: 60,
        }
    }
}

/// Terminal outcome of a door launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorOutcome {
    /// The program exited on its own
    Completed {
        /// Raw exit code
        exit_code: i32,
    },
    /// Spawn/bridge failure or nonzero exit
    Error,
    /// The per-call time limit expired and the program was terminated
    TimedOut,
}

impl fmt::Display for DoorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorOutcome::Completed { exit_code } => write!(f, "completed({})", exit_code),
            DoorOutcome::Error => write!(f, "error"),
            DoorOutcome::TimedOut => write!(f, "timed-out"),
        }
    }
}
