//! dw-server: The doorway daemon
//!
//! Accepts raw TCP connections, negotiates a telnet session for each
//! caller, tracks the live node set, and launches legacy door programs
//! bridged to the caller over an emulated serial line.

pub mod door;
pub mod server;
pub mod session;
pub mod state;
pub mod stats;

pub use state::ServerState;
