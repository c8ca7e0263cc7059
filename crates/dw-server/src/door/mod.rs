//! Door program orchestration
//!
//! Launching a door means: admission checks against the descriptor, a
//! per-launch work directory with a byte-exact drop file, an emulated
//! serial endpoint (a PTY pair), the spawned process, a pair of byte
//! pumps bridging caller and process, and a supervisor enforcing the time
//! limit and the escalating-termination contract.

pub mod bridge;
pub mod dropfile;
pub mod orchestrator;
pub mod serial;

pub use bridge::SerialBridge;
pub use dropfile::DropFileContext;
pub use orchestrator::{DoorOrchestrator, DoorSession, DoorState};
pub use serial::{LineStatus, SerialChannel};
