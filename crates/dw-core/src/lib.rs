//! dw-core: Shared types, configuration and collaborator seams for doorway
//!
//! This crate provides the domain types, error taxonomy, configuration
//! structures, and the channel/trait seams through which the protocol core
//! talks to its external collaborators (user directory, statistics sinks).

pub mod config;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod events;
pub mod time;
pub mod types;

pub use config::ServerConfig;
pub use descriptor::{ClockTime, DoorDescriptor, DropFileKind, Schedule};
pub use directory::{MemoryDirectory, UserDirectory};
pub use error::{ConfigError, DwError, LaunchError, SessionError};
pub use events::{EventBus, NodeEvent};
pub use types::{DoorOutcome, LaunchId, SessionId, SessionState, UserProfile};
