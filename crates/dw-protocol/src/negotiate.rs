//! Telnet option negotiation
//!
//! On connect the server proactively offers to take over echo, suppress
//! go-ahead, and asks the client for its terminal type and window size.
//! The negotiator is a pure state machine: the caller feeds it decoded
//! frames and writes out whatever replies it produces. The caller also
//! bounds the wait; an unanswered option falls back to its documented
//! default instead of holding the session hostage.
//!
//! # Handshake
//!
//! 1. Server sends `WILL ECHO`, `WILL SUPPRESS_GO_AHEAD`, `DO TERMINAL_TYPE`,
//!    `DO NAWS`.
//! 2. Client answers each with DO/DONT (for our WILLs) or WILL/WONT (for our
//!    DOs).
//! 3. A client that promised `TERMINAL_TYPE` is sent `SB TERMINAL_TYPE SEND`
//!    and answers with `SB TERMINAL_TYPE IS <name>`.
//! 4. A client that promised `NAWS` reports its window size via
//!    subnegotiation, and keeps reporting on every resize for the life of
//!    the session.

use bytes::Bytes;

use crate::telnet::{option, Negotiation, TelnetFrame};

/// Terminal type subnegotiation: payload starts with IS
const TTYPE_IS: u8 = 0;
/// Terminal type subnegotiation: payload starts with SEND
const TTYPE_SEND: u8 = 1;

/// Terminal type reported when the client never answers
pub const DEFAULT_TERM_TYPE: &str = "unknown";

/// Client viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Number of columns
    pub cols: u16,
    /// Number of rows
    pub rows: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        // The safe fallback viewport
        Self { cols: 80, rows: 24 }
    }
}

/// The negotiated session parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalProfile {
    /// Whether the server echoes input (client local echo off)
    pub server_echo: bool,
    /// Whether go-ahead signalling is suppressed
    pub suppress_go_ahead: bool,
    /// Reported terminal type, lowercased ("unknown" if never reported)
    pub term_type: String,
    /// Client viewport
    pub size: TerminalSize,
}

impl Default for TerminalProfile {
    fn default() -> Self {
        Self {
            server_echo: true,
            suppress_go_ahead: true,
            term_type: DEFAULT_TERM_TYPE.to_string(),
            size: TerminalSize::default(),
        }
    }
}

/// State of one offered option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    /// Waiting for the peer's answer
    Pending,
    /// Peer agreed
    Accepted,
    /// Peer refused (or never answered before the deadline)
    Refused,
}

/// Drives the option handshake for one session
#[derive(Debug)]
pub struct Negotiator {
    echo: Offer,
    suppress_go_ahead: Offer,
    term_type: Offer,
    naws: Offer,
    /// Set once `SB TERMINAL_TYPE IS` arrives
    reported_type: Option<String>,
    /// Most recent NAWS report
    reported_size: Option<TerminalSize>,
}

impl Negotiator {
    /// Create a negotiator with all offers outstanding
    pub fn new() -> Self {
        Self {
            echo: Offer::Pending,
            suppress_go_ahead: Offer::Pending,
            term_type: Offer::Pending,
            naws: Offer::Pending,
            reported_type: None,
            reported_size: None,
        }
    }

    /// The server's opening offers, sent immediately after accept
    pub fn offers(&self) -> Vec<TelnetFrame> {
        vec![
            TelnetFrame::Negotiate(Negotiation::Will, option::ECHO),
            TelnetFrame::Negotiate(Negotiation::Will, option::SUPPRESS_GO_AHEAD),
            TelnetFrame::Negotiate(Negotiation::Do, option::TERMINAL_TYPE),
            TelnetFrame::Negotiate(Negotiation::Do, option::NAWS),
        ]
    }

    /// Consume one decoded frame, returning any replies to send.
    ///
    /// Frames unrelated to negotiation are ignored here; NAWS reports are
    /// accepted even after settlement so resizes keep flowing.
    pub fn on_frame(&mut self, frame: &TelnetFrame) -> Vec<TelnetFrame> {
        let mut replies = Vec::new();

        match frame {
            TelnetFrame::Negotiate(Negotiation::Do, option::ECHO) => {
                self.echo = Offer::Accepted;
            }
            TelnetFrame::Negotiate(Negotiation::Dont, option::ECHO) => {
                self.echo = Offer::Refused;
            }
            TelnetFrame::Negotiate(Negotiation::Do, option::SUPPRESS_GO_AHEAD) => {
                self.suppress_go_ahead = Offer::Accepted;
            }
            TelnetFrame::Negotiate(Negotiation::Dont, option::SUPPRESS_GO_AHEAD) => {
                self.suppress_go_ahead = Offer::Refused;
            }
            TelnetFrame::Negotiate(Negotiation::Will, option::TERMINAL_TYPE) => {
                if self.term_type == Offer::Pending {
                    // Ask for the name now that the client has promised it
                    replies.push(TelnetFrame::Subnegotiate(
                        option::TERMINAL_TYPE,
                        Bytes::from_static(&[TTYPE_SEND]),
                    ));
                }
                self.term_type = Offer::Accepted;
            }
            TelnetFrame::Negotiate(Negotiation::Wont, option::TERMINAL_TYPE) => {
                self.term_type = Offer::Refused;
            }
            TelnetFrame::Negotiate(Negotiation::Will, option::NAWS) => {
                self.naws = Offer::Accepted;
            }
            TelnetFrame::Negotiate(Negotiation::Wont, option::NAWS) => {
                self.naws = Offer::Refused;
            }

            // Refuse anything we never offered
            TelnetFrame::Negotiate(Negotiation::Will, opt) => {
                replies.push(TelnetFrame::Negotiate(Negotiation::Dont, *opt));
            }
            TelnetFrame::Negotiate(Negotiation::Do, opt) => {
                replies.push(TelnetFrame::Negotiate(Negotiation::Wont, *opt));
            }
            TelnetFrame::Negotiate(_, _) => {}

            TelnetFrame::Subnegotiate(option::TERMINAL_TYPE, payload) => {
                if payload.first() == Some(&TTYPE_IS) && payload.len() > 1 {
                    let name = String::from_utf8_lossy(&payload[1..])
                        .trim()
                        .to_lowercase();
                    if !name.is_empty() {
                        tracing::debug!("Client reported terminal type {:?}", name);
                        self.reported_type = Some(name);
                    }
                }
            }
            TelnetFrame::Subnegotiate(option::NAWS, payload) => {
                if let Some(size) = parse_naws(payload) {
                    self.reported_size = Some(size);
                }
            }
            TelnetFrame::Subnegotiate(opt, _) => {
                tracing::debug!("Ignoring subnegotiation for unrequested option {}", opt);
            }

            TelnetFrame::Data(_) | TelnetFrame::Command(_) => {}
        }

        replies
    }

    /// Whether every offer has been answered (and a promised terminal type
    /// has actually arrived)
    pub fn is_settled(&self) -> bool {
        let options_answered = self.echo != Offer::Pending
            && self.suppress_go_ahead != Offer::Pending
            && self.term_type != Offer::Pending
            && self.naws != Offer::Pending;

        let ttype_done = self.term_type != Offer::Accepted || self.reported_type.is_some();
        // NAWS clients usually report immediately after WILL; wait for the
        // first report so the session starts with the real viewport.
        let naws_done = self.naws != Offer::Accepted || self.reported_size.is_some();

        options_answered && ttype_done && naws_done
    }

    /// Produce the final profile, applying defaults for anything the client
    /// left unanswered.
    pub fn finish(self) -> TerminalProfile {
        TerminalProfile {
            // An unanswered echo offer defaults to server-side echo: the
            // client's local echo is assumed off.
            server_echo: self.echo != Offer::Refused,
            suppress_go_ahead: self.suppress_go_ahead != Offer::Refused,
            term_type: self
                .reported_type
                .unwrap_or_else(|| DEFAULT_TERM_TYPE.to_string()),
            size: self.reported_size.unwrap_or_default(),
        }
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a NAWS payload: 16-bit big-endian width then height.
///
/// Zero dimensions are ignored per RFC 1073 (a zero means "unknown").
pub fn parse_naws(payload: &[u8]) -> Option<TerminalSize> {
    if payload.len() != 4 {
        tracing::debug!("Malformed NAWS payload of {} bytes", payload.len());
        return None;
    }
    let cols = u16::from_be_bytes([payload[0], payload[1]]);
    let rows = u16::from_be_bytes([payload[2], payload[3]]);
    if cols == 0 || rows == 0 {
        return None;
    }
    Some(TerminalSize::new(cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_offers() {
        let neg = Negotiator::new();
        let offers = neg.offers();
        assert_eq!(offers.len(), 4);
        assert!(offers.contains(&TelnetFrame::Negotiate(Negotiation::Will, option::ECHO)));
        assert!(offers.contains(&TelnetFrame::Negotiate(Negotiation::Do, option::NAWS)));
    }

    #[test]
    fn test_full_handshake_settles() {
        let mut neg = Negotiator::new();

        neg.on_frame(&TelnetFrame::Negotiate(Negotiation::Do, option::ECHO));
        neg.on_frame(&TelnetFrame::Negotiate(
            Negotiation::Do,
            option::SUPPRESS_GO_AHEAD,
        ));

        let replies = neg.on_frame(&TelnetFrame::Negotiate(
            Negotiation::Will,
            option::TERMINAL_TYPE,
        ));
        assert_eq!(
            replies,
            vec![TelnetFrame::Subnegotiate(
                option::TERMINAL_TYPE,
                Bytes::from_static(&[TTYPE_SEND])
            )]
        );

        neg.on_frame(&TelnetFrame::Negotiate(Negotiation::Will, option::NAWS));
        assert!(!neg.is_settled());

        neg.on_frame(&TelnetFrame::Subnegotiate(
            option::TERMINAL_TYPE,
            Bytes::from_static(&[TTYPE_IS, b'A', b'N', b'S', b'I']),
        ));
        neg.on_frame(&TelnetFrame::Subnegotiate(
            option::NAWS,
            Bytes::from_static(&[0, 132, 0, 50]),
        ));
        assert!(neg.is_settled());

        let profile = neg.finish();
        assert!(profile.server_echo);
        assert!(profile.suppress_go_ahead);
        assert_eq!(profile.term_type, "ansi");
        assert_eq!(profile.size, TerminalSize::new(132, 50));
    }

    #[test]
    fn test_silent_client_falls_back_to_defaults() {
        // Client never answers anything; the caller gives up at the deadline
        let neg = Negotiator::new();
        assert!(!neg.is_settled());

        let profile = neg.finish();
        assert!(profile.server_echo);
        assert_eq!(profile.term_type, DEFAULT_TERM_TYPE);
        assert_eq!(profile.size, TerminalSize::new(80, 24));
    }

    #[test]
    fn test_refusals_settle_without_subnegotiation() {
        let mut neg = Negotiator::new();
        neg.on_frame(&TelnetFrame::Negotiate(Negotiation::Dont, option::ECHO));
        neg.on_frame(&TelnetFrame::Negotiate(
            Negotiation::Dont,
            option::SUPPRESS_GO_AHEAD,
        ));
        neg.on_frame(&TelnetFrame::Negotiate(
            Negotiation::Wont,
            option::TERMINAL_TYPE,
        ));
        neg.on_frame(&TelnetFrame::Negotiate(Negotiation::Wont, option::NAWS));
        assert!(neg.is_settled());

        let profile = neg.finish();
        assert!(!profile.server_echo);
        assert!(!profile.suppress_go_ahead);
        assert_eq!(profile.term_type, DEFAULT_TERM_TYPE);
    }

    #[test]
    fn test_unrequested_option_refused() {
        let mut neg = Negotiator::new();
        // Client volunteers LINEMODE (34); we never asked for it
        let replies = neg.on_frame(&TelnetFrame::Negotiate(Negotiation::Will, 34));
        assert_eq!(replies, vec![TelnetFrame::Negotiate(Negotiation::Dont, 34)]);

        let replies = neg.on_frame(&TelnetFrame::Negotiate(Negotiation::Do, 34));
        assert_eq!(replies, vec![TelnetFrame::Negotiate(Negotiation::Wont, 34)]);
    }

    #[test]
    fn test_parse_naws() {
        assert_eq!(
            parse_naws(&[0, 80, 0, 24]),
            Some(TerminalSize::new(80, 24))
        );
        assert_eq!(parse_naws(&[1, 0, 0, 50]), Some(TerminalSize::new(256, 50)));
        // Zero dimension means unknown
        assert_eq!(parse_naws(&[0, 0, 0, 24]), None);
        // Wrong length
        assert_eq!(parse_naws(&[0, 80, 0]), None);
    }
}
