//! Tokio codec for the telnet wire
//!
//! Telnet multiplexes control traffic onto the data stream behind a single
//! escape byte (IAC, 255). A literal 255 in application data is doubled on
//! the wire and undoubled on receipt. The codec splits the incoming stream
//! into data chunks, option negotiations, and subnegotiations, holding
//! partial sequences across reads.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Interpret-as-command escape byte
pub const IAC: u8 = 255;

/// End of subnegotiation
pub const SE: u8 = 240;
/// No operation
pub const NOP: u8 = 241;
/// Go ahead
pub const GA: u8 = 249;
/// Start of subnegotiation
pub const SB: u8 = 250;
/// Sender wants to enable an option on its side
pub const WILL: u8 = 251;
/// Sender refuses to enable an option on its side
pub const WONT: u8 = 252;
/// Sender asks the peer to enable an option
pub const DO: u8 = 253;
/// Sender asks the peer to disable an option
pub const DONT: u8 = 254;

/// Telnet option codes used by the negotiator
pub mod option {
    /// Server-side echo (RFC 857)
    pub const ECHO: u8 = 1;
    /// Suppress go-ahead (RFC 858)
    pub const SUPPRESS_GO_AHEAD: u8 = 3;
    /// Terminal type (RFC 1091)
    pub const TERMINAL_TYPE: u8 = 24;
    /// Negotiate about window size (RFC 1073)
    pub const NAWS: u8 = 31;
}

/// Upper bound on a buffered subnegotiation payload
pub const MAX_SUBNEGOTIATION: usize = 4096;

/// Direction of an option negotiation command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Will,
    Wont,
    Do,
    Dont,
}

impl Negotiation {
    /// The wire byte for this command
    pub fn command_byte(&self) -> u8 {
        match self {
            Negotiation::Will => WILL,
            Negotiation::Wont => WONT,
            Negotiation::Do => DO,
            Negotiation::Dont => DONT,
        }
    }

    fn from_command_byte(byte: u8) -> Option<Self> {
        match byte {
            WILL => Some(Negotiation::Will),
            WONT => Some(Negotiation::Wont),
            DO => Some(Negotiation::Do),
            DONT => Some(Negotiation::Dont),
            _ => None,
        }
    }
}

/// One decoded unit from the telnet stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetFrame {
    /// Application data with IAC doubling already undone
    Data(Bytes),
    /// A bare two-byte command (`IAC <cmd>`, 240..=249)
    Command(u8),
    /// An option negotiation (`IAC WILL/WONT/DO/DONT <opt>`)
    Negotiate(Negotiation, u8),
    /// A subnegotiation (`IAC SB <opt> ... IAC SE`), payload undoubled
    Subnegotiate(u8, Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Plain data bytes
    Data,
    /// Saw IAC, waiting for the command byte
    Command,
    /// Saw IAC WILL/WONT/DO/DONT, waiting for the option byte
    Option(Negotiation),
    /// Saw IAC SB, waiting for the option byte
    SubOption,
    /// Collecting subnegotiation payload
    SubData,
    /// Saw IAC inside a subnegotiation
    SubCommand,
}

/// Codec for decoding/encoding telnet frames
#[derive(Debug)]
pub struct TelnetCodec {
    state: DecodeState,
    sub_option: u8,
    sub_data: BytesMut,
}

impl TelnetCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            state: DecodeState::Data,
            sub_option: 0,
            sub_data: BytesMut::new(),
        }
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while !src.is_empty() {
            match self.state {
                DecodeState::Data => {
                    match src.iter().position(|&b| b == IAC) {
                        // A run of plain data before the next escape
                        Some(0) => {
                            src.advance(1);
                            self.state = DecodeState::Command;
                        }
                        Some(pos) => {
                            return Ok(Some(TelnetFrame::Data(src.split_to(pos).freeze())));
                        }
                        None => {
                            return Ok(Some(TelnetFrame::Data(src.split().freeze())));
                        }
                    }
                }

                DecodeState::Command => {
                    let byte = src.get_u8();
                    if byte == IAC {
                        // Doubled escape: a literal 255 in the data stream
                        self.state = DecodeState::Data;
                        return Ok(Some(TelnetFrame::Data(Bytes::from_static(&[IAC]))));
                    } else if let Some(neg) = Negotiation::from_command_byte(byte) {
                        self.state = DecodeState::Option(neg);
                    } else if byte == SB {
                        self.state = DecodeState::SubOption;
                    } else if (SE..=GA).contains(&byte) {
                        self.state = DecodeState::Data;
                        return Ok(Some(TelnetFrame::Command(byte)));
                    } else {
                        // Malformed: skip the byte, keep the session alive
                        tracing::debug!("Skipping unknown telnet command byte {}", byte);
                        self.state = DecodeState::Data;
                    }
                }

                DecodeState::Option(neg) => {
                    let opt = src.get_u8();
                    self.state = DecodeState::Data;
                    return Ok(Some(TelnetFrame::Negotiate(neg, opt)));
                }

                DecodeState::SubOption => {
                    self.sub_option = src.get_u8();
                    self.sub_data.clear();
                    self.state = DecodeState::SubData;
                }

                DecodeState::SubData => {
                    let byte = src.get_u8();
                    if byte == IAC {
                        self.state = DecodeState::SubCommand;
                    } else {
                        if self.sub_data.len() >= MAX_SUBNEGOTIATION {
                            return Err(ProtocolError::SubnegotiationTooLong {
                                size: self.sub_data.len() + 1,
                                max: MAX_SUBNEGOTIATION,
                            });
                        }
                        self.sub_data.put_u8(byte);
                    }
                }

                DecodeState::SubCommand => {
                    let byte = src.get_u8();
                    match byte {
                        IAC => {
                            if self.sub_data.len() >= MAX_SUBNEGOTIATION {
                                return Err(ProtocolError::SubnegotiationTooLong {
                                    size: self.sub_data.len() + 1,
                                    max: MAX_SUBNEGOTIATION,
                                });
                            }
                            self.sub_data.put_u8(IAC);
                            self.state = DecodeState::SubData;
                        }
                        SE => {
                            self.state = DecodeState::Data;
                            return Ok(Some(TelnetFrame::Subnegotiate(
                                self.sub_option,
                                self.sub_data.split().freeze(),
                            )));
                        }
                        other => {
                            tracing::debug!(
                                "Skipping unexpected byte {} inside subnegotiation",
                                other
                            );
                            self.state = DecodeState::SubData;
                        }
                    }
                }
            }
        }

        // Buffer exhausted mid-sequence: hold state for the next read
        Ok(None)
    }
}

impl Encoder<TelnetFrame> for TelnetCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: TelnetFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            TelnetFrame::Data(data) => {
                dst.reserve(data.len());
                for &byte in data.iter() {
                    dst.put_u8(byte);
                    if byte == IAC {
                        dst.put_u8(IAC);
                    }
                }
            }
            TelnetFrame::Command(cmd) => {
                dst.reserve(2);
                dst.put_u8(IAC);
                dst.put_u8(cmd);
            }
            TelnetFrame::Negotiate(neg, opt) => {
                dst.reserve(3);
                dst.put_u8(IAC);
                dst.put_u8(neg.command_byte());
                dst.put_u8(opt);
            }
            TelnetFrame::Subnegotiate(opt, payload) => {
                dst.reserve(payload.len() + 5);
                dst.put_u8(IAC);
                dst.put_u8(SB);
                dst.put_u8(opt);
                for &byte in payload.iter() {
                    dst.put_u8(byte);
                    if byte == IAC {
                        dst.put_u8(IAC);
                    }
                }
                dst.put_u8(IAC);
                dst.put_u8(SE);
            }
        }
        Ok(())
    }
}
