//! Output rendering for the negotiated terminal
//!
//! Formatted output (color, cursor movement, clearing) is encoded as ANSI
//! escape sequences when the client reported a capable terminal type. Any
//! type we do not recognize gets the monochrome subset: attributes render
//! as nothing and clearing degrades to a line break, so a dumb terminal
//! never receives sequences it would print as garbage.

use bytes::{BufMut, BytesMut};

/// Terminal type prefixes that understand ANSI escape sequences
const ANSI_TYPES: &[&str] = &[
    "ansi", "vt100", "vt102", "vt220", "xterm", "linux", "screen", "tmux", "rxvt",
];

/// The classic 8-color palette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    /// SGR foreground code
    fn fg_code(&self) -> u8 {
        30 + self.offset()
    }

    /// SGR background code
    fn bg_code(&self) -> u8 {
        40 + self.offset()
    }

    fn offset(&self) -> u8 {
        match self {
            Color::Black => 0,
            Color::Red => 1,
            Color::Green => 2,
            Color::Yellow => 3,
            Color::Blue => 4,
            Color::Magenta => 5,
            Color::Cyan => 6,
            Color::White => 7,
        }
    }
}

/// Encodes formatted output for one session's terminal
#[derive(Debug, Clone)]
pub struct Renderer {
    ansi: bool,
}

impl Renderer {
    /// Pick the dialect for a negotiated terminal type
    pub fn for_terminal(term_type: &str) -> Self {
        let lowered = term_type.to_lowercase();
        let ansi = ANSI_TYPES.iter().any(|t| lowered.starts_with(t));
        Self { ansi }
    }

    /// A renderer restricted to the monochrome subset
    pub fn monochrome() -> Self {
        Self { ansi: false }
    }

    /// Whether full ANSI output is in effect
    pub fn is_ansi(&self) -> bool {
        self.ansi
    }

    /// Clear the screen and home the cursor
    pub fn clear_screen(&self, out: &mut BytesMut) {
        if self.ansi {
            out.put_slice(b"\x1b[2J\x1b[H");
        } else {
            out.put_slice(b"\r\n");
        }
    }

    /// Move the cursor to a 1-based row and column
    pub fn move_to(&self, out: &mut BytesMut, row: u16, col: u16) {
        if self.ansi {
            out.put_slice(format!("\x1b[{};{}H", row, col).as_bytes());
        }
    }

    /// Set the foreground color
    pub fn set_fg(&self, out: &mut BytesMut, color: Color, bright: bool) {
        if self.ansi {
            if bright {
                out.put_slice(format!("\x1b[1;{}m", color.fg_code()).as_bytes());
            } else {
                out.put_slice(format!("\x1b[{}m", color.fg_code()).as_bytes());
            }
        }
    }

    /// Set the background color
    pub fn set_bg(&self, out: &mut BytesMut, color: Color) {
        if self.ansi {
            out.put_slice(format!("\x1b[{}m", color.bg_code()).as_bytes());
        }
    }

    /// Bold/high-intensity attribute
    pub fn bold(&self, out: &mut BytesMut) {
        if self.ansi {
            out.put_slice(b"\x1b[1m");
        }
    }

    /// Reset all attributes
    pub fn reset(&self, out: &mut BytesMut) {
        if self.ansi {
            out.put_slice(b"\x1b[0m");
        }
    }

    /// Line break as the wire expects it
    pub fn newline(&self, out: &mut BytesMut) {
        out.put_slice(b"\r\n");
    }

    /// Plain text
    pub fn text(&self, out: &mut BytesMut, s: &str) {
        out.put_slice(s.as_bytes());
    }

    /// Text followed by a line break
    pub fn line(&self, out: &mut BytesMut, s: &str) {
        self.text(out, s);
        self.newline(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_type_detection() {
        assert!(Renderer::for_terminal("ansi").is_ansi());
        assert!(Renderer::for_terminal("ANSI").is_ansi());
        assert!(Renderer::for_terminal("xterm-256color").is_ansi());
        assert!(Renderer::for_terminal("vt100").is_ansi());
        assert!(!Renderer::for_terminal("unknown").is_ansi());
        assert!(!Renderer::for_terminal("tty43").is_ansi());
    }

    #[test]
    fn test_ansi_output() {
        let r = Renderer::for_terminal("ansi");
        let mut out = BytesMut::new();
        r.clear_screen(&mut out);
        r.move_to(&mut out, 5, 10);
        r.set_fg(&mut out, Color::Cyan, true);
        r.reset(&mut out);
        assert_eq!(&out[..], b"\x1b[2J\x1b[H\x1b[5;10H\x1b[1;36m\x1b[0m");
    }

    #[test]
    fn test_monochrome_suppresses_sequences() {
        let r = Renderer::for_terminal("unknown");
        let mut out = BytesMut::new();
        r.set_fg(&mut out, Color::Red, false);
        r.set_bg(&mut out, Color::Blue);
        r.bold(&mut out);
        r.move_to(&mut out, 1, 1);
        r.reset(&mut out);
        assert!(out.is_empty());

        r.clear_screen(&mut out);
        assert_eq!(&out[..], b"\r\n");
    }

    #[test]
    fn test_line_uses_crlf() {
        let r = Renderer::monochrome();
        let mut out = BytesMut::new();
        r.line(&mut out, "WELCOME");
        assert_eq!(&out[..], b"WELCOME\r\n");
    }
}
