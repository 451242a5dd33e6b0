//! Parser for the tape language.
//!
//! The top-level entry points are [`parse_str`] and [`parse_file`].
//!
//! A tape is one command per line. The head token names the command and may
//! carry modifiers: `Type@100ms "slow"`, `Backspace 3`, `Ctrl+Alt+x`,
//! `Wait+Screen@10s /done/`.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::command::{
    Chord, Command, CommandKind, Key, KeyPress, Modifier, NamedKey, Tape, WaitFor, WaitScope,
};
use crate::error::ParseError;
use crate::settings::SettingName;

/// Parse a tape from a string slice.
///
/// Lines that are empty or start with `#` are ignored. Inline comments
/// (` # …`) are stripped while preserving `#` inside quoted strings.
///
/// # Errors
///
/// Returns a [`ParseError`] naming the 1-based line of the first unknown
/// command, unknown setting or malformed argument.
///
/// # Example
///
/// ```
/// use tapereel::parse_str;
///
/// let tape = parse_str("Sleep 500ms\nType \"hello world\"\n").unwrap();
/// assert_eq!(tape.len(), 2);
/// ```
pub fn parse_str(content: &str) -> Result<Tape, ParseError> {
    let mut commands = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = strip_inline_comment(line);
        commands.push(parse_line(index + 1, line)?);
    }
    Ok(Tape::new(commands))
}

/// Parse a tape from a file.
///
/// Reads the entire file into memory and delegates to [`parse_str`].
///
/// # Example
///
/// ```no_run
/// use tapereel::parse_file;
///
/// let tape = parse_file("demo.tape").unwrap();
/// ```
pub fn parse_file(path: impl AsRef<Path>) -> Result<Tape, ParseError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&content)
}

/// Parse one non-empty, non-comment line.
fn parse_line(line_num: usize, line: &str) -> Result<Command, ParseError> {
    let (head, args) = split_word(line);
    let keyword_end = head.find(['+', '@']).unwrap_or(head.len());
    let kind = CommandKind::from_keyword(&head[..keyword_end]).ok_or_else(|| {
        ParseError::UnknownCommand {
            line: line_num,
            text: line.to_string(),
        }
    })?;
    let invalid = |message: String| ParseError::invalid(line_num, message);

    let command = match kind {
        CommandKind::Ctrl | CommandKind::Alt | CommandKind::Shift => {
            no_args(kind, args).map_err(invalid)?;
            let chord = parse_chord(head).map_err(invalid)?;
            match kind {
                CommandKind::Ctrl => Command::Ctrl(chord),
                CommandKind::Alt => Command::Alt(chord),
                _ => Command::Shift(chord),
            }
        }
        CommandKind::Wait => {
            let wait = parse_wait(head, args).map_err(invalid)?;
            Command::Wait(wait)
        }
        CommandKind::Set => parse_set(line_num, args)?,
        _ => {
            let (name, speed) = split_speed(head).map_err(invalid)?;
            if name.len() != kind.keyword().len() {
                return Err(invalid(format!("{kind} takes no modifiers, got {head}")));
            }
            parse_simple(kind, speed, args).map_err(invalid)?
        }
    };
    Ok(command)
}

fn parse_simple(kind: CommandKind, speed: Option<Duration>, args: &str) -> Result<Command, String> {
    let key_press = || -> Result<KeyPress, String> {
        let repeat = if args.is_empty() {
            1
        } else {
            args.parse::<usize>()
                .map_err(|_| format!("{kind} repeat count must be a number, got {args}"))?
        };
        Ok(KeyPress { repeat, speed })
    };
    if speed.is_some() && !takes_speed(kind) {
        return Err(format!("{kind} does not take a speed"));
    }

    let command = match kind {
        CommandKind::Backspace => Command::Backspace(key_press()?),
        CommandKind::Delete => Command::Delete(key_press()?),
        CommandKind::Insert => Command::Insert(key_press()?),
        CommandKind::Down => Command::Down(key_press()?),
        CommandKind::Enter => Command::Enter(key_press()?),
        CommandKind::Escape => Command::Escape(key_press()?),
        CommandKind::Left => Command::Left(key_press()?),
        CommandKind::PageUp => Command::PageUp(key_press()?),
        CommandKind::PageDown => Command::PageDown(key_press()?),
        CommandKind::Right => Command::Right(key_press()?),
        CommandKind::Space => Command::Space(key_press()?),
        CommandKind::Tab => Command::Tab(key_press()?),
        CommandKind::Up => Command::Up(key_press()?),
        CommandKind::Type => Command::Type {
            text: parse_quoted_string(args)?,
            speed,
        },
        CommandKind::Sleep => {
            Command::Sleep(parse_duration(args).map_err(|err| err.to_string())?)
        }
        CommandKind::Output => Command::Output(required(kind, args)?),
        CommandKind::Screenshot => Command::Screenshot(required(kind, args)?),
        CommandKind::Source => Command::Source(required(kind, args)?),
        CommandKind::Require => Command::Require(required(kind, args)?),
        CommandKind::Copy => Command::Copy(parse_quoted_string(args)?),
        CommandKind::Env => {
            let (key, value) = split_word(args);
            if key.is_empty() || value.is_empty() {
                return Err("Env expects a name and a value".to_string());
            }
            Command::Env {
                key: key.to_string(),
                value: parse_argument(value)?,
            }
        }
        CommandKind::Paste => no_args(kind, args).map(|()| Command::Paste)?,
        CommandKind::Hide => no_args(kind, args).map(|()| Command::Hide)?,
        CommandKind::Show => no_args(kind, args).map(|()| Command::Show)?,
        CommandKind::Ctrl
        | CommandKind::Alt
        | CommandKind::Shift
        | CommandKind::Wait
        | CommandKind::Set => return Err(format!("{kind} needs its own syntax")),
    };
    Ok(command)
}

fn takes_speed(kind: CommandKind) -> bool {
    matches!(
        kind,
        CommandKind::Type
            | CommandKind::Backspace
            | CommandKind::Delete
            | CommandKind::Insert
            | CommandKind::Down
            | CommandKind::Enter
            | CommandKind::Escape
            | CommandKind::Left
            | CommandKind::PageUp
            | CommandKind::PageDown
            | CommandKind::Right
            | CommandKind::Space
            | CommandKind::Tab
            | CommandKind::Up
    )
}

/// `Ctrl+Alt+x`, `Shift+Tab`, `Alt+Enter`.
fn parse_chord(head: &str) -> Result<Chord, String> {
    let parts: Vec<&str> = head.split('+').collect();
    let Some((key, modifier_names)) = parts.split_last() else {
        return Err(format!("malformed key combination {head}"));
    };
    if modifier_names.is_empty() || key.is_empty() {
        return Err(format!("{head} is missing a key"));
    }

    let mut modifiers = Vec::with_capacity(modifier_names.len());
    for name in modifier_names {
        let modifier = match *name {
            "Ctrl" => Modifier::Ctrl,
            "Alt" => Modifier::Alt,
            "Shift" => Modifier::Shift,
            other => return Err(format!("unknown modifier {other} in {head}")),
        };
        if !modifiers.contains(&modifier) {
            modifiers.push(modifier);
        }
    }

    let mut chars = key.chars();
    let key = match (chars.next(), chars.next()) {
        (Some(ch), None) => Key::Char(ch),
        _ => NamedKey::from_name(key)
            .map(Key::Named)
            .ok_or_else(|| format!("unknown key {key} in {head}"))?,
    };
    Ok(Chord { modifiers, key })
}

/// `Wait[+Line|+Screen][@timeout] [/regex/]`
fn parse_wait(head: &str, args: &str) -> Result<WaitFor, String> {
    let (name, timeout) = split_speed(head)?;
    let scope = match name.strip_prefix("Wait") {
        Some("") | Some("+Line") => WaitScope::Line,
        Some("+Screen") => WaitScope::Screen,
        _ => return Err(format!("unknown wait scope in {head}")),
    };
    let pattern = if args.is_empty() {
        None
    } else {
        Some(parse_regex(args)?)
    };
    Ok(WaitFor {
        scope,
        timeout,
        pattern,
    })
}

fn parse_set(line_num: usize, args: &str) -> Result<Command, ParseError> {
    let (name, value) = split_word(args);
    if name.is_empty() {
        return Err(ParseError::invalid(line_num, "Set expects a setting name"));
    }
    let setting = SettingName::from_str(name).map_err(|()| ParseError::UnknownSetting {
        line: line_num,
        name: name.to_string(),
    })?;
    if value.is_empty() {
        return Err(ParseError::invalid(
            line_num,
            format!("Set {setting} expects a value"),
        ));
    }
    let parsed = if value.starts_with('/') {
        parse_regex(value)
    } else {
        parse_argument(value)
    };
    let value = parsed.map_err(|message| ParseError::invalid(line_num, message))?;
    Ok(Command::Set { setting, value })
}

/// Split `Name@duration` into the name and the optional duration.
fn split_speed(head: &str) -> Result<(&str, Option<Duration>), String> {
    match head.split_once('@') {
        Some((name, speed)) => {
            let speed = parse_duration(speed).map_err(|err| err.to_string())?;
            Ok((name, Some(speed)))
        }
        None => Ok((head, None)),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn no_args(kind: CommandKind, args: &str) -> Result<(), String> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(format!("{kind} takes no arguments, got {args}"))
    }
}

fn required(kind: CommandKind, args: &str) -> Result<String, String> {
    if args.is_empty() {
        return Err(format!("{kind} expects an argument"));
    }
    parse_argument(args)
}

/// A quoted string, or the bare remainder of the line.
fn parse_argument(s: &str) -> Result<String, String> {
    match s.chars().next() {
        Some('"' | '\'' | '`') => parse_quoted_string(s),
        _ => Ok(s.trim().to_string()),
    }
}

/// `/regex/`; slashes inside need no escaping since the last `/` closes it.
fn parse_regex(s: &str) -> Result<String, String> {
    let s = s.trim();
    s.strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .map(str::to_string)
        .ok_or_else(|| format!("expected a /regex/, got {s}"))
}

/// Strip inline comments from a line, preserving `#` inside quoted strings.
/// A `#` only starts a comment at the start of a word.
fn strip_inline_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev = ' ';
    for (i, ch) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if let Some(open) = quote {
            if ch == '\\' && open == '"' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
        } else if matches!(ch, '"' | '\'' | '`') {
            quote = Some(ch);
        } else if ch == '#' && prev.is_whitespace() {
            return line[..i].trim();
        }
        prev = ch;
    }
    line
}

#[derive(Debug, Error)]
#[error("invalid duration {0:?}: expected e.g. 500ms, 1.5s or 2")]
pub(crate) struct InvalidDuration(String);

/// Parse a duration string: `500ms`, `1.5s`, or bare seconds like `2`.
pub(crate) fn parse_duration(s: &str) -> Result<Duration, InvalidDuration> {
    let s = s.trim();
    let invalid = || InvalidDuration(s.to_string());
    let (number, scale) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1e-3)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1.0)
    } else {
        (s, 1.0)
    };
    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    let secs = value * scale;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

/// Parse a string in `"…"`, `'…'` or `` `…` ``. Double-quoted strings process
/// `\n`, `\t`, `\"` and `\\`; the others are taken literally.
pub(crate) fn parse_quoted_string(s: &str) -> Result<String, String> {
    let s = s.trim();
    let mut chars = s.char_indices();
    let quote = match chars.next() {
        Some((_, ch @ ('"' | '\'' | '`'))) => ch,
        _ => return Err(format!("expected a quoted string, got {s}")),
    };

    let mut out = String::new();
    let mut escaped = false;
    for (i, ch) in chars {
        if escaped {
            match ch {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                '"' | '\\' => out.push(ch),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
            escaped = false;
        } else if ch == '\\' && quote == '"' {
            escaped = true;
        } else if ch == quote {
            let rest = s[i + ch.len_utf8()..].trim();
            if !rest.is_empty() {
                return Err(format!("unexpected text after closing quote: {rest}"));
            }
            return Ok(out);
        } else {
            out.push(ch);
        }
    }
    Err(format!("unclosed quote in {s}"))
}
