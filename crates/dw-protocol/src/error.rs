//! Protocol error types

use thiserror::Error;

/// Errors that can occur on the telnet wire
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Subnegotiation payload exceeds the buffering bound
    #[error("Subnegotiation too long: {size} bytes exceeds maximum of {max} bytes")]
    SubnegotiationTooLong { size: usize, max: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
