//! Door program descriptors
//!
//! A descriptor is the immutable configuration record for one external door
//! program: where its executable lives, how the command line is built, which
//! drop-file format it parses, who may run it and when, and the emulated
//! serial parameters it is presented with. Descriptors are supplied by the
//! registry collaborator (in practice, the `[doors]` table of the config
//! file) and never mutated by the core.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::serde_utils::duration_secs;

/// The drop-file layouts doorway can generate.
///
/// Legacy door programs parse these positionally, so each variant owns an
/// exact, byte-for-byte field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropFileKind {
    /// The 52-line positional `DOOR.SYS` layout
    DoorSys,
    /// The 13-line `DORINFO1.DEF` layout
    DorInfo,
}

impl DropFileKind {
    /// The file name the door expects to find in its working directory
    pub fn file_name(&self) -> &'static str {
        match self {
            DropFileKind::DoorSys => "DOOR.SYS",
            DropFileKind::DorInfo => "DORINFO1.DEF",
        }
    }
}

/// A wall-clock time of day, minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    /// Minutes since midnight
    pub fn minute_of_day(&self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }
}

impl FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got {:?}", s))?;
        let hour: u8 = h.parse().map_err(|_| format!("bad hour in {:?}", s))?;
        let minute: u8 = m.parse().map_err(|_| format!("bad minute in {:?}", s))?;
        if hour > 23 || minute > 59 {
            return Err(format!("time out of range: {:?}", s));
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A daily availability window.
///
/// The window may wrap past midnight (`open 22:00, close 02:00`). Opening
/// and closing at the same minute means the door is never available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub open: ClockTime,
    pub close: ClockTime,
}

impl Schedule {
    /// Whether the given minute-of-day falls inside the window
    pub fn contains(&self, minute_of_day: u16) -> bool {
        let open = self.open.minute_of_day();
        let close = self.close.minute_of_day();
        if open <= close {
            minute_of_day >= open && minute_of_day < close
        } else {
            // Wraps midnight
            minute_of_day >= open || minute_of_day < close
        }
    }
}

/// Immutable launch record for one external door program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorDescriptor {
    /// Display name shown on the door menu
    pub name: String,

    /// Path to the executable
    pub command: PathBuf,

    /// Command-line template. Tokens `{dropfile}`, `{dropdir}`, `{node}`,
    /// `{port}` and `{baud}` are substituted per launch.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the spawned process (defaults to the
    /// per-launch drop directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Which drop-file layout the program parses
    pub dropfile: DropFileKind,

    /// Minimum security level allowed to launch
    #[serde(default)]
    pub min_security: u8,

    /// Maximum security level allowed to launch
    #[serde(default = "default_max_security")]
    pub max_security: u8,

    /// Per-call time limit
    #[serde(default = "default_time_limit", with = "duration_secs")]
    pub time_limit: Duration,

    /// Launches allowed per user per day; 0 means unlimited
    #[serde(default)]
    pub daily_limit: u32,

    /// Simulated line speed for the drop file and optional throttling
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Serial port name presented to the program
    #[serde(default = "default_port_name")]
    pub port_name: String,

    /// Throttle the process→caller pump to the simulated baud rate
    #[serde(default)]
    pub throttle: bool,

    /// Written for shared multi-node play (surfaced to the program via the
    /// drop file; launches stay independent processes either way)
    #[serde(default)]
    pub multi_instance: bool,

    /// Daily availability window; absent means always open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

fn default_max_security() -> u8 {
    255
}

fn default_time_limit() -> Duration {
    Duration::from_secs(3600)
}

fn default_baud() -> u32 {
    38_400
}

fn default_port_name() -> String {
    "COM1".to_string()
}

impl DoorDescriptor {
    /// Whether a user at this security level may launch the door
    pub fn allows_security(&self, level: u8) -> bool {
        level >= self.min_security && level <= self.max_security
    }

    /// Whether the door is open at the given minute-of-day
    pub fn open_at(&self, minute_of_day: u16) -> bool {
        match &self.schedule {
            Some(window) => window.contains(minute_of_day),
            None => true,
        }
    }
}
