//! [`Keys`] presses single keys, [`ChordKeys`] presses modifier combinations.
//!
//! Script syntax:
//! - `Enter`, `Backspace@100ms 3`, `PageDown 2`
//! - `Ctrl+C`, `Ctrl+Alt+x`, `Alt+Enter`, `Shift+Tab`, `Ctrl+Left`

use crate::command::{
    Chord, Command, CommandHandler, Context, Key, KeyPress, Modifier, NamedKey, unexpected,
};
use crate::error::CommandError;
use async_trait::async_trait;

/// Plain key commands: `Backspace`, `Delete`, `Insert`, arrows, `Enter`,
/// `Escape`, `PageUp`, `PageDown`, `Space` and `Tab`.
pub struct Keys;

/// `Ctrl+…`, `Alt+…` and `Shift+…` chords.
pub struct ChordKeys;

#[derive(Debug, Clone, Copy, Default)]
struct Modifiers {
    ctrl: bool,
    alt: bool,
    shift: bool,
}

impl Modifiers {
    fn of(chord: &Chord) -> Self {
        Self {
            ctrl: chord.has(Modifier::Ctrl),
            alt: chord.has(Modifier::Alt),
            shift: chord.has(Modifier::Shift),
        }
    }

    // xterm modifier parameter: 1 + shift + 2·alt + 4·ctrl
    fn param(self) -> u8 {
        1 + u8::from(self.shift) + 2 * u8::from(self.alt) + 4 * u8::from(self.ctrl)
    }
}

fn plain_key(command: &Command) -> Option<(NamedKey, KeyPress)> {
    let key = match command {
        Command::Backspace(p) => (NamedKey::Backspace, *p),
        Command::Delete(p) => (NamedKey::Delete, *p),
        Command::Insert(p) => (NamedKey::Insert, *p),
        Command::Down(p) => (NamedKey::Down, *p),
        Command::Enter(p) => (NamedKey::Enter, *p),
        Command::Escape(p) => (NamedKey::Escape, *p),
        Command::Left(p) => (NamedKey::Left, *p),
        Command::PageUp(p) => (NamedKey::PageUp, *p),
        Command::PageDown(p) => (NamedKey::PageDown, *p),
        Command::Right(p) => (NamedKey::Right, *p),
        Command::Space(p) => (NamedKey::Space, *p),
        Command::Tab(p) => (NamedKey::Tab, *p),
        Command::Up(p) => (NamedKey::Up, *p),
        _ => return None,
    };
    Some(key)
}

/// Bytes a terminal sends for an unmodified named key.
pub fn key_bytes(key: NamedKey) -> Vec<u8> {
    named_bytes(key, Modifiers::default()).0
}

/// Bytes a terminal sends for `chord`.
pub fn chord_bytes(chord: &Chord) -> Result<Vec<u8>, CommandError> {
    let mods = Modifiers::of(chord);
    let (mut bytes, alt_encoded) = match chord.key {
        Key::Named(key) => named_bytes(key, mods),
        Key::Char(c) => (char_bytes(c, mods)?, false),
    };
    if mods.alt && !alt_encoded {
        bytes.insert(0, 0x1b);
    }
    Ok(bytes)
}

fn char_bytes(c: char, mods: Modifiers) -> Result<Vec<u8>, CommandError> {
    if mods.ctrl {
        return control_code(c)
            .map(|code| vec![code])
            .ok_or_else(|| CommandError::argument(format!("Ctrl+{c} has no control code")));
    }
    let text: String = if mods.shift {
        c.to_uppercase().collect()
    } else {
        c.to_string()
    };
    Ok(text.into_bytes())
}

fn control_code(c: char) -> Option<u8> {
    match c.to_ascii_uppercase() {
        c @ '@'..='_' => Some(c as u8 - 0x40),
        ' ' => Some(0x00),
        '?' => Some(0x7f),
        _ => None,
    }
}

/// Returns the bytes and whether alt is already folded into them.
fn named_bytes(key: NamedKey, mods: Modifiers) -> (Vec<u8>, bool) {
    let param = mods.param();
    let cursor = |letter: u8| {
        if param == 1 {
            vec![0x1b, b'[', letter]
        } else {
            format!("\x1b[1;{param}{}", letter as char).into_bytes()
        }
    };
    let tilde = |code: u8| {
        if param == 1 {
            format!("\x1b[{code}~").into_bytes()
        } else {
            format!("\x1b[{code};{param}~").into_bytes()
        }
    };
    match key {
        NamedKey::Up => (cursor(b'A'), true),
        NamedKey::Down => (cursor(b'B'), true),
        NamedKey::Right => (cursor(b'C'), true),
        NamedKey::Left => (cursor(b'D'), true),
        NamedKey::Home => (cursor(b'H'), true),
        NamedKey::End => (cursor(b'F'), true),
        NamedKey::Insert => (tilde(2), true),
        NamedKey::Delete => (tilde(3), true),
        NamedKey::PageUp => (tilde(5), true),
        NamedKey::PageDown => (tilde(6), true),
        NamedKey::Enter => (vec![b'\r'], false),
        NamedKey::Escape => (vec![0x1b], false),
        NamedKey::Tab if mods.shift => (b"\x1b[Z".to_vec(), false),
        NamedKey::Tab => (vec![b'\t'], false),
        NamedKey::Backspace if mods.ctrl => (vec![0x08], false),
        NamedKey::Backspace => (vec![0x7f], false),
        NamedKey::Space if mods.ctrl => (vec![0x00], false),
        NamedKey::Space => (vec![b' '], false),
    }
}

#[async_trait(?Send)]
impl CommandHandler for Keys {
    fn name(&self) -> &'static str {
        "key"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let (key, press) = plain_key(command).ok_or_else(|| unexpected(self, command))?;
        let bytes = key_bytes(key);
        let delay = press.speed.unwrap_or(ctx.settings().typing_speed);
        for _ in 0..press.repeat {
            ctx.press(&bytes, delay).await?;
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl CommandHandler for ChordKeys {
    fn name(&self) -> &'static str {
        "chord"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let chord = match command {
            Command::Ctrl(chord) | Command::Alt(chord) | Command::Shift(chord) => chord,
            _ => return Err(unexpected(self, command)),
        };
        let bytes = chord_bytes(chord)?;
        let delay = ctx.settings().typing_speed;
        ctx.press(&bytes, delay).await
    }
}
