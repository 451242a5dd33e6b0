//! The terminal seam the engine drives, and the screen snapshot it reads back.
//!
//! [`crate::pty::PtyTerminal`] runs a real shell. [`Loopback`] echoes
//! keystrokes through the same screen model without spawning anything, which
//! is what dry runs and the engine tests use.

use anyhow::Result;
use std::collections::BTreeMap;

const MAX_SCROLLBACK: usize = 0;

/// A live terminal session: write input, resize, read the visible screen.
pub trait Terminal {
    /// Write raw bytes to the program's input.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn resize(&mut self, rows: u16, cols: u16) -> Result<()>;

    /// Snapshot the visible screen. Output produced so far is applied first.
    fn snapshot(&mut self) -> Result<Screen>;
}

/// What a new session is started with.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub shell: String,
    pub rows: u16,
    pub cols: u16,
    pub env: BTreeMap<String, String>,
}

pub type TerminalFactory = Box<dyn Fn(&SessionConfig) -> Result<Box<dyn Terminal>>>;

/// Visible terminal state at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub rows: u16,
    pub cols: u16,
    /// One entry per row, trailing blanks trimmed.
    pub lines: Vec<String>,
    /// Escape sequence that redraws this screen, attributes included.
    pub formatted: Vec<u8>,
    pub cursor: (u16, u16),
}

impl Screen {
    pub fn from_parser(parser: &vt100::Parser) -> Self {
        let screen = parser.screen();
        let (rows, cols) = screen.size();
        Self {
            rows,
            cols,
            lines: screen
                .rows(0, cols)
                .map(|row| row.trim_end().to_string())
                .collect(),
            formatted: screen.contents_formatted(),
            cursor: screen.cursor_position(),
        }
    }

    /// Screen text with trailing empty rows removed.
    pub fn text(&self) -> String {
        let end = self
            .lines
            .iter()
            .rposition(|line| !line.is_empty())
            .map_or(0, |i| i + 1);
        self.lines[..end].join("\n")
    }

    /// The last row that has any content, or `""`.
    pub fn last_line(&self) -> &str {
        self.lines
            .iter()
            .rev()
            .find(|line| !line.is_empty())
            .map_or("", String::as_str)
    }
}

/// An in-process terminal with a fixed `> ` prompt that echoes keystrokes
/// the way a cooked-mode line discipline would.
pub struct Loopback {
    parser: vt100::Parser,
}

impl Loopback {
    pub const PROMPT: &'static [u8] = b"> ";

    pub fn new(rows: u16, cols: u16) -> Self {
        let mut parser = vt100::Parser::new(rows, cols, MAX_SCROLLBACK);
        parser.process(Self::PROMPT);
        Self { parser }
    }

    /// Factory suitable for [`crate::Engine::with_terminal`].
    pub fn factory() -> TerminalFactory {
        Box::new(|config: &SessionConfig| {
            Ok(Box::new(Loopback::new(config.rows, config.cols)) as Box<dyn Terminal>)
        })
    }

    fn echo(bytes: &[u8]) -> Vec<u8> {
        // Escape sequences (arrow keys and friends) move the cursor as-is.
        if bytes.first() == Some(&0x1b) && bytes.len() > 1 {
            return bytes.to_vec();
        }
        let mut out = Vec::with_capacity(bytes.len());
        for &byte in bytes {
            match byte {
                b'\r' | b'\n' => {
                    out.extend_from_slice(b"\r\n");
                    out.extend_from_slice(Self::PROMPT);
                }
                0x7f | 0x08 => out.extend_from_slice(b"\x08 \x08"),
                0x03 => {
                    out.extend_from_slice(b"^C\r\n");
                    out.extend_from_slice(Self::PROMPT);
                }
                0x0c => {
                    out.extend_from_slice(b"\x1b[H\x1b[2J");
                    out.extend_from_slice(Self::PROMPT);
                }
                b'\t' => out.push(b'\t'),
                0x1b => out.extend_from_slice(b"^["),
                0x00..=0x1f => {
                    out.push(b'^');
                    out.push(byte + 0x40);
                }
                _ => out.push(byte),
            }
        }
        out
    }
}

impl Terminal for Loopback {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let echoed = Self::echo(bytes);
        self.parser.process(&echoed);
        Ok(())
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        self.parser.set_size(rows, cols);
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Screen> {
        Ok(Screen::from_parser(&self.parser))
    }
}
