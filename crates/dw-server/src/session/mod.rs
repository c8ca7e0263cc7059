//! Session lifecycle management

pub mod handle;
pub mod registry;
pub mod sweep;
pub mod task;

pub use handle::{Outbound, Session};
pub use registry::SessionRegistry;
