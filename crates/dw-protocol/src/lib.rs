//! dw-protocol: Telnet wire protocol for doorway
//!
//! This crate turns the raw byte stream of a caller's connection into a
//! clean logical stream and back. It contains the telnet codec (option
//! commands, byte stuffing), the option negotiator, the input escape-sequence
//! parser, and the output renderer for the negotiated terminal type.

pub mod error;
pub mod input;
pub mod negotiate;
pub mod output;
pub mod telnet;

pub use error::ProtocolError;
pub use input::{InputEvent, InputParser, Key};
pub use negotiate::{Negotiator, TerminalProfile, TerminalSize};
pub use output::{Color, Renderer};
pub use telnet::{Negotiation, TelnetCodec, TelnetFrame};
