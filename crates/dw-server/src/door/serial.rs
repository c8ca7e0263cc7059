//! Emulated serial endpoint
//!
//! Legacy door programs expect to talk to a hardware serial line. The
//! emulation is a PTY pair: the slave side is handed to the spawned
//! process as its controlling line, the master side is consumed by the
//! bridge pumps. Since no hardware exists, the modem status signals the
//! programs poll for are simply always asserted.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, CommandBuilder, PtyPair, PtySize};

use dw_core::error::LaunchError;
use dw_core::types::{LaunchId, SessionId};
use dw_protocol::TerminalSize;

/// Byte counters for one channel, shared with the bridge pumps
#[derive(Debug, Clone, Default)]
pub struct SerialCounters {
    bytes_in: Arc<AtomicU64>,
    bytes_out: Arc<AtomicU64>,
}

impl SerialCounters {
    /// Count caller→process bytes
    pub fn add_in(&self, n: usize) {
        self.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Count process→caller bytes
    pub fn add_out(&self, n: usize) {
        self.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Total caller→process bytes
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    /// Total process→caller bytes
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }
}

/// Modem status lines as a door program sees them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineStatus {
    pub carrier_detect: bool,
    pub clear_to_send: bool,
    pub data_set_ready: bool,
}

/// Unique endpoint name for one launch.
///
/// Derived from the session and launch identifiers, so concurrent
/// launches can never collide.
pub fn endpoint_name(session: SessionId, launch: LaunchId) -> String {
    format!("dwtty-{}-{}", session.as_u32(), launch.as_u32())
}

/// The emulated serial line for one door launch.
///
/// Lifetime is bound to its launch: created at Starting, dropped at any
/// terminal state, which closes both endpoint halves.
pub struct SerialChannel {
    name: String,
    pair: PtyPair,
    counters: SerialCounters,
}

impl SerialChannel {
    /// Open a fresh endpoint pair sized to the caller's viewport
    pub fn open(
        session: SessionId,
        launch: LaunchId,
        size: TerminalSize,
    ) -> Result<Self, LaunchError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| LaunchError::Bridge(format!("failed to open endpoint: {}", e)))?;

        Ok(Self {
            name: endpoint_name(session, launch),
            pair,
            counters: SerialCounters::default(),
        })
    }

    /// Logical endpoint name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modem status: no hardware, so every line is permanently ready
    pub fn status(&self) -> LineStatus {
        LineStatus {
            carrier_detect: true,
            clear_to_send: true,
            data_set_ready: true,
        }
    }

    /// The channel's byte counters
    pub fn counters(&self) -> SerialCounters {
        self.counters.clone()
    }

    /// Spawn the door process on the endpoint's process side
    pub fn spawn(&self, cmd: CommandBuilder) -> Result<Box<dyn Child + Send + Sync>, LaunchError> {
        self.pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| LaunchError::SpawnFailed(e.to_string()))
    }

    /// Reader for the internal side (process output)
    pub fn clone_reader(&self) -> Result<Box<dyn Read + Send>, LaunchError> {
        self.pair
            .master
            .try_clone_reader()
            .map_err(|e| LaunchError::Bridge(format!("failed to clone endpoint reader: {}", e)))
    }

    /// Writer for the internal side (caller input)
    pub fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, LaunchError> {
        self.pair
            .master
            .take_writer()
            .map_err(|e| LaunchError::Bridge(format!("failed to take endpoint writer: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_names_are_unique_per_launch() {
        let a = endpoint_name(SessionId::new(1), LaunchId::new(1));
        let b = endpoint_name(SessionId::new(1), LaunchId::new(2));
        let c = endpoint_name(SessionId::new(2), LaunchId::new(1));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_open_channel() {
        let channel = SerialChannel::open(
            SessionId::new(3),
            LaunchId::new(7),
            TerminalSize::default(),
        )
        .unwrap();

        assert_eq!(channel.name(), "dwtty-3-7");
        assert_eq!(channel.counters().bytes_in(), 0);
        assert_eq!(channel.counters().bytes_out(), 0);
    }

    #[test]
    fn test_status_lines_always_asserted() {
        let channel = SerialChannel::open(
            SessionId::new(1),
            LaunchId::new(1),
            TerminalSize::default(),
        )
        .unwrap();

        let status = channel.status();
        assert!(status.carrier_detect);
        assert!(status.clear_to_send);
        assert!(status.data_set_ready);
    }
}
