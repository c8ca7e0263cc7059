//! Input escape-sequence translation
//!
//! Turns the decoded data stream into logical key events. Multi-byte
//! sequences (CSI and SS3) are recognized for arrows, editing keys, and
//! function keys; a sequence split across reads is held in a short buffer
//! until its final byte arrives. Anything unrecognized is dropped with a
//! debug log rather than corrupting the stream.

const ESC: u8 = 0x1b;
const CR: u8 = 0x0d;
const LF: u8 = 0x0a;
const NUL: u8 = 0x00;
const BS: u8 = 0x08;
const DEL: u8 = 0x7f;
const TAB: u8 = 0x09;

/// A recognized special key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    Tab,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Insert,
    Delete,
    PageUp,
    PageDown,
    /// F1..F12
    Function(u8),
}

/// One logical input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A recognized special key
    Key(Key),
    /// A plain byte (printable or otherwise untranslated)
    Byte(u8),
}

/// Stateful parser for the session's input bytes
#[derive(Debug, Default)]
pub struct InputParser {
    /// Partial escape sequence held across reads
    pending: Vec<u8>,
    /// A CR was just seen; swallow its NUL/LF companion
    after_cr: bool,
}

impl InputParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning the events they complete
    pub fn push(&mut self, data: &[u8]) -> Vec<InputEvent> {
        let mut events = Vec::new();
        for &byte in data {
            self.push_byte(byte, &mut events);
        }
        events
    }

    /// Release a dangling partial sequence as literal bytes.
    ///
    /// A lone ESC held in the buffer becomes the Escape key; any longer
    /// prefix is returned byte-by-byte.
    pub fn flush(&mut self) -> Vec<InputEvent> {
        let pending = std::mem::take(&mut self.pending);
        if pending == [ESC] {
            return vec![InputEvent::Key(Key::Escape)];
        }
        pending.into_iter().map(InputEvent::Byte).collect()
    }

    fn push_byte(&mut self, byte: u8, events: &mut Vec<InputEvent>) {
        // Telnet clients terminate a line with CR LF or CR NUL; either way
        // it is a single Enter.
        if self.after_cr {
            self.after_cr = false;
            if byte == LF || byte == NUL {
                return;
            }
        }

        if self.pending.is_empty() {
            match byte {
                CR => {
                    self.after_cr = true;
                    events.push(InputEvent::Key(Key::Enter));
                }
                LF => events.push(InputEvent::Key(Key::Enter)),
                BS | DEL => events.push(InputEvent::Key(Key::Backspace)),
                TAB => events.push(InputEvent::Key(Key::Tab)),
                ESC => self.pending.push(ESC),
                other => events.push(InputEvent::Byte(other)),
            }
            return;
        }

        self.pending.push(byte);
        match self.pending.as_slice() {
            // Still a valid prefix: wait for more
            [ESC] | [ESC, b'['] | [ESC, b'O'] => {}
            [ESC, b'[', rest @ ..] => {
                let last = *rest.last().unwrap_or(&0);
                // A CSI sequence ends on its first byte in 0x40..=0x7e
                if (0x40..=0x7e).contains(&last) {
                    if let Some(key) = decode_csi(rest) {
                        events.push(InputEvent::Key(key));
                    } else {
                        tracing::debug!("Dropping unrecognized CSI sequence {:?}", rest);
                    }
                    self.pending.clear();
                } else if rest.len() > 16 {
                    tracing::debug!("Dropping runaway CSI sequence");
                    self.pending.clear();
                }
            }
            [ESC, b'O', final_byte] => {
                if let Some(key) = decode_ss3(*final_byte) {
                    events.push(InputEvent::Key(key));
                } else {
                    tracing::debug!("Dropping unrecognized SS3 sequence {}", final_byte);
                }
                self.pending.clear();
            }
            // ESC followed by anything else: the ESC stood alone
            [ESC, other] => {
                events.push(InputEvent::Key(Key::Escape));
                let other = *other;
                self.pending.clear();
                self.push_byte(other, events);
            }
            _ => {
                tracing::debug!("Dropping malformed input sequence {:?}", self.pending);
                self.pending.clear();
            }
        }
    }
}

/// Decode a complete CSI body (everything after `ESC [`)
fn decode_csi(body: &[u8]) -> Option<Key> {
    match body {
        [b'A'] => Some(Key::Up),
        [b'B'] => Some(Key::Down),
        [b'C'] => Some(Key::Right),
        [b'D'] => Some(Key::Left),
        [b'H'] => Some(Key::Home),
        [b'F'] => Some(Key::End),
        [params @ .., b'~'] => {
            let number: u8 = std::str::from_utf8(params).ok()?.parse().ok()?;
            match number {
                1 => Some(Key::Home),
                2 => Some(Key::Insert),
                3 => Some(Key::Delete),
                4 => Some(Key::End),
                5 => Some(Key::PageUp),
                6 => Some(Key::PageDown),
                11..=15 => Some(Key::Function(number - 10)),
                17..=21 => Some(Key::Function(number - 11)),
                23 | 24 => Some(Key::Function(number - 12)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Decode an SS3 final byte (everything after `ESC O`)
fn decode_ss3(final_byte: u8) -> Option<Key> {
    match final_byte {
        b'A' => Some(Key::Up),
        b'B' => Some(Key::Down),
        b'C' => Some(Key::Right),
        b'D' => Some(Key::Left),
        b'H' => Some(Key::Home),
        b'F' => Some(Key::End),
        b'P' => Some(Key::Function(1)),
        b'Q' => Some(Key::Function(2)),
        b'R' => Some(Key::Function(3)),
        b'S' => Some(Key::Function(4)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_bytes() {
        let mut parser = InputParser::new();
        let events = parser.push(b"hi");
        assert_eq!(events, vec![InputEvent::Byte(b'h'), InputEvent::Byte(b'i')]);
    }

    #[test]
    fn test_cr_lf_is_one_enter() {
        let mut parser = InputParser::new();
        assert_eq!(parser.push(b"\r\n"), vec![InputEvent::Key(Key::Enter)]);
        assert_eq!(parser.push(b"\r\0"), vec![InputEvent::Key(Key::Enter)]);
    }

    #[test]
    fn test_arrow_keys() {
        let mut parser = InputParser::new();
        assert_eq!(
            parser.push(b"\x1b[A\x1b[D"),
            vec![InputEvent::Key(Key::Up), InputEvent::Key(Key::Left)]
        );
        assert_eq!(parser.push(b"\x1bOC"), vec![InputEvent::Key(Key::Right)]);
    }

    #[test]
    fn test_function_keys() {
        let mut parser = InputParser::new();
        assert_eq!(
            parser.push(b"\x1b[11~"),
            vec![InputEvent::Key(Key::Function(1))]
        );
        assert_eq!(
            parser.push(b"\x1b[24~"),
            vec![InputEvent::Key(Key::Function(12))]
        );
        assert_eq!(
            parser.push(b"\x1bOP"),
            vec![InputEvent::Key(Key::Function(1))]
        );
    }

    #[test]
    fn test_sequence_split_across_reads() {
        let mut parser = InputParser::new();
        assert_eq!(parser.push(b"\x1b"), vec![]);
        assert_eq!(parser.push(b"["), vec![]);
        assert_eq!(parser.push(b"5~"), vec![InputEvent::Key(Key::PageUp)]);
    }

    #[test]
    fn test_lone_escape_then_printable() {
        let mut parser = InputParser::new();
        let events = parser.push(b"\x1bq");
        assert_eq!(
            events,
            vec![InputEvent::Key(Key::Escape), InputEvent::Byte(b'q')]
        );
    }

    #[test]
    fn test_unrecognized_sequence_dropped() {
        let mut parser = InputParser::new();
        // CSI with an unknown final byte produces nothing, stream continues
        let events = parser.push(b"\x1b[Zx");
        assert_eq!(events, vec![InputEvent::Byte(b'x')]);
    }

    #[test]
    fn test_flush_releases_prefix() {
        let mut parser = InputParser::new();
        assert_eq!(parser.push(b"\x1b"), vec![]);
        assert_eq!(parser.flush(), vec![InputEvent::Key(Key::Escape)]);

        assert_eq!(parser.push(b"\x1b["), vec![]);
        assert_eq!(
            parser.flush(),
            vec![InputEvent::Byte(ESC), InputEvent::Byte(b'[')]
        );
    }

    #[test]
    fn test_backspace_variants() {
        let mut parser = InputParser::new();
        assert_eq!(
            parser.push(&[BS, DEL]),
            vec![
                InputEvent::Key(Key::Backspace),
                InputEvent::Key(Key::Backspace)
            ]
        );
    }
}
