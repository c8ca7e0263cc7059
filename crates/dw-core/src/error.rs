//! Error taxonomy for the doorway core

use std::path::PathBuf;

use dw_protocol::ProtocolError;
use thiserror::Error;

use crate::types::SessionId;

/// Top-level error type for the doorway ecosystem
#[derive(Error, Debug)]
pub enum DwError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Door launch error
    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Admission refused: the node limit is reached
    #[error("All {max} nodes are in use")]
    LimitExceeded { max: usize },

    /// Session not found
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// The underlying connection failed or the peer hung up
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Operation on a session already past Closing
    #[error("Session is closed")]
    Closed,
}

/// Door launch and supervision errors
#[derive(Error, Debug)]
pub enum LaunchError {
    /// No descriptor registered under this slug
    #[error("Unknown door: {0}")]
    UnknownDoor(String),

    /// Caller's security level is outside the descriptor's band
    #[error("Security level {actual} outside allowed range {min}..={max}")]
    SecurityLevel { min: u8, max: u8, actual: u8 },

    /// The caller used up today's allowance for this door
    #[error("Daily limit of {limit} reached")]
    QuotaExhausted { limit: u32 },

    /// The door's availability window is closed right now
    #[error("Door is closed at this hour")]
    OutsideSchedule,

    /// The session already has a door running
    #[error("A door is already running on this node")]
    DoorBusy,

    /// The executable would not spawn
    #[error("Failed to spawn door: {0}")]
    SpawnFailed(String),

    /// The serial bridge broke while the door was running
    #[error("Serial bridge failure: {0}")]
    Bridge(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_messages() {
        let e = LaunchError::SecurityLevel {
            min: 50,
            max: 255,
            actual: 40,
        };
        assert_eq!(
            e.to_string(),
            "Security level 40 outside allowed range 50..=255"
        );

        let e = SessionError::LimitExceeded { max: 2 };
        assert_eq!(e.to_string(), "All 2 nodes are in use");
    }
}
