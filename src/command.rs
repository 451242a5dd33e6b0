//! The closed command model, the [`CommandHandler`] trait and the
//! [`Context`] handlers receive when executed.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::CommandError;
use crate::interpolate::interpolate_with;
use crate::recorder::{FrameOrigin, FrameSequence, Recorder};
use crate::settings::Settings;
use crate::sleeper::Sleeper;
use crate::terminal::{Screen, SessionConfig, Terminal, TerminalFactory};

macro_rules! command_kinds {
    ($($variant:ident),+ $(,)?) => {
        /// Discriminant of [`Command`]. The set is closed: the parser rejects
        /// anything else before execution starts.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandKind {
            $($variant),+
        }

        impl CommandKind {
            pub const ALL: &'static [CommandKind] = &[$(CommandKind::$variant),+];

            /// The tape keyword.
            pub fn keyword(self) -> &'static str {
                match self {
                    $(CommandKind::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

command_kinds!(
    Backspace, Delete, Insert, Ctrl, Alt, Down, Enter, Escape, Hide, Left, Output, PageUp,
    PageDown, Right, Set, Show, Sleep, Space, Tab, Type, Up, Wait, Source, Screenshot, Copy,
    Paste, Shift, Env, Require,
);

impl CommandKind {
    pub const COUNT: usize = 29;

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.keyword() == keyword)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Repeat count and optional per-press delay of a plain key command, e.g.
/// `Backspace@100ms 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub repeat: usize,
    pub speed: Option<Duration>,
}

impl Default for KeyPress {
    fn default() -> Self {
        Self {
            repeat: 1,
            speed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedKey {
    Backspace,
    Delete,
    Insert,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
    Enter,
    Escape,
    Space,
    Tab,
}

impl NamedKey {
    const NAMES: &'static [(&'static str, NamedKey)] = &[
        ("Backspace", NamedKey::Backspace),
        ("Delete", NamedKey::Delete),
        ("Insert", NamedKey::Insert),
        ("Up", NamedKey::Up),
        ("Down", NamedKey::Down),
        ("Left", NamedKey::Left),
        ("Right", NamedKey::Right),
        ("PageUp", NamedKey::PageUp),
        ("PageDown", NamedKey::PageDown),
        ("Home", NamedKey::Home),
        ("End", NamedKey::End),
        ("Enter", NamedKey::Enter),
        ("Escape", NamedKey::Escape),
        ("Space", NamedKey::Space),
        ("Tab", NamedKey::Tab),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, key)| *key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Named(NamedKey),
    Char(char),
}

/// A modifier combination such as `Ctrl+Alt+x`. `modifiers` always starts
/// with the modifier that named the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    pub modifiers: Vec<Modifier>,
    pub key: Key,
}

impl Chord {
    pub fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitScope {
    #[default]
    Line,
    Screen,
}

/// `Wait[+Line|+Screen][@timeout] [/regex/]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WaitFor {
    pub scope: WaitScope,
    pub timeout: Option<Duration>,
    pub pattern: Option<String>,
}

/// One tape command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Backspace(KeyPress),
    Delete(KeyPress),
    Insert(KeyPress),
    Down(KeyPress),
    Enter(KeyPress),
    Escape(KeyPress),
    Left(KeyPress),
    PageUp(KeyPress),
    PageDown(KeyPress),
    Right(KeyPress),
    Space(KeyPress),
    Tab(KeyPress),
    Up(KeyPress),
    Ctrl(Chord),
    Alt(Chord),
    Shift(Chord),
    Type {
        text: String,
        speed: Option<Duration>,
    },
    Sleep(Duration),
    Wait(WaitFor),
    Set {
        setting: crate::settings::SettingName,
        value: String,
    },
    Output(String),
    Screenshot(String),
    Copy(String),
    Paste,
    Hide,
    Show,
    Require(String),
    Env {
        key: String,
        value: String,
    },
    Source(String),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Backspace(_) => CommandKind::Backspace,
            Self::Delete(_) => CommandKind::Delete,
            Self::Insert(_) => CommandKind::Insert,
            Self::Down(_) => CommandKind::Down,
            Self::Enter(_) => CommandKind::Enter,
            Self::Escape(_) => CommandKind::Escape,
            Self::Left(_) => CommandKind::Left,
            Self::PageUp(_) => CommandKind::PageUp,
            Self::PageDown(_) => CommandKind::PageDown,
            Self::Right(_) => CommandKind::Right,
            Self::Space(_) => CommandKind::Space,
            Self::Tab(_) => CommandKind::Tab,
            Self::Up(_) => CommandKind::Up,
            Self::Ctrl(_) => CommandKind::Ctrl,
            Self::Alt(_) => CommandKind::Alt,
            Self::Shift(_) => CommandKind::Shift,
            Self::Type { .. } => CommandKind::Type,
            Self::Sleep(_) => CommandKind::Sleep,
            Self::Wait(_) => CommandKind::Wait,
            Self::Set { .. } => CommandKind::Set,
            Self::Output(_) => CommandKind::Output,
            Self::Screenshot(_) => CommandKind::Screenshot,
            Self::Copy(_) => CommandKind::Copy,
            Self::Paste => CommandKind::Paste,
            Self::Hide => CommandKind::Hide,
            Self::Show => CommandKind::Show,
            Self::Require(_) => CommandKind::Require,
            Self::Env { .. } => CommandKind::Env,
            Self::Source(_) => CommandKind::Source,
        }
    }

    /// Copy of the command with `expand` applied to every free-text or path
    /// argument. Wait patterns are regexes and are left alone.
    pub fn map_text<F>(&self, expand: F) -> Command
    where
        F: Fn(&str) -> String,
    {
        match self {
            Self::Type { text, speed } => Self::Type {
                text: expand(text),
                speed: *speed,
            },
            Self::Set { setting, value } => Self::Set {
                setting: *setting,
                value: expand(value),
            },
            Self::Output(path) => Self::Output(expand(path)),
            Self::Screenshot(path) => Self::Screenshot(expand(path)),
            Self::Copy(text) => Self::Copy(expand(text)),
            Self::Require(program) => Self::Require(expand(program)),
            Self::Env { key, value } => Self::Env {
                key: key.clone(),
                value: expand(value),
            },
            Self::Source(path) => Self::Source(expand(path)),
            other => other.clone(),
        }
    }
}

/// An ordered, immutable list of commands. Order is execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tape {
    commands: Vec<Command>,
}

impl Tape {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }
}

impl From<Vec<Command>> for Tape {
    fn from(commands: Vec<Command>) -> Self {
        Self::new(commands)
    }
}

impl<'a> IntoIterator for &'a Tape {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Execution state passed to [`CommandHandler::execute`].
///
/// Owns the settings, the recorder and the terminal session for one run.
/// Logical time only moves through [`Context::advance`], which is also where
/// capture ticks happen.
pub struct Context {
    pub(crate) settings: Settings,
    pub(crate) recorder: Recorder,
    pub(crate) terminal: Option<Box<dyn Terminal>>,
    pub(crate) factory: TerminalFactory,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    pub(crate) cancel: Arc<AtomicBool>,
    pub(crate) clipboard: String,
    pub(crate) elapsed: Duration,
    pub(crate) startup_delay: Duration,
    pub(crate) sourcing: bool,
}

impl Context {
    pub(crate) fn new(
        factory: TerminalFactory,
        sleeper: Arc<dyn Sleeper>,
        cancel: Arc<AtomicBool>,
        startup_delay: Duration,
    ) -> Self {
        let settings = Settings::default();
        let recorder = Recorder::new(settings.frame_interval());
        Self {
            settings,
            recorder,
            terminal: None,
            factory,
            sleeper,
            cancel,
            clipboard: String::new(),
            elapsed: Duration::ZERO,
            startup_delay,
            sourcing: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Logical script time, hidden stretches included.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recorder.set_recording(recording);
    }

    pub fn clipboard(&self) -> &str {
        &self.clipboard
    }

    pub fn set_clipboard(&mut self, text: impl Into<String>) {
        self.clipboard = text.into();
    }

    pub fn terminal_started(&self) -> bool {
        self.terminal.is_some()
    }

    /// Tape `Env` overrides first, then the process environment.
    pub fn lookup_env(&self, name: &str) -> Option<String> {
        self.settings
            .env
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    pub fn interpolate(&self, command: &Command) -> Command {
        command.map_text(|text| interpolate_with(text, |name| self.lookup_env(name)))
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), CommandError> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(CommandError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Spawn the session if it is not running yet.
    pub(crate) async fn ensure_terminal(&mut self) -> Result<(), CommandError> {
        if self.terminal.is_some() {
            return Ok(());
        }
        let (rows, cols) = self.settings.terminal_size();
        let config = SessionConfig {
            shell: self.settings.shell.clone(),
            rows,
            cols,
            env: self.settings.env.clone(),
        };
        info!(shell = %config.shell, rows, cols, "starting terminal session");
        let terminal = (self.factory)(&config).map_err(CommandError::session)?;
        self.terminal = Some(terminal);
        self.sleeper.sleep(self.startup_delay).await;
        Ok(())
    }

    fn live_terminal(&mut self) -> Result<&mut (dyn Terminal + 'static), CommandError> {
        self.terminal
            .as_deref_mut()
            .ok_or_else(|| CommandError::Session("terminal session is not running".to_string()))
    }

    /// Write bytes to the session as one keystroke.
    pub async fn write_to_terminal(&mut self, bytes: &[u8]) -> Result<(), CommandError> {
        self.ensure_terminal().await?;
        self.live_terminal()?
            .write(bytes)
            .map_err(CommandError::session)
    }

    /// Write one keystroke, then let `delay` of logical time pass.
    pub async fn press(&mut self, bytes: &[u8], delay: Duration) -> Result<(), CommandError> {
        self.check_cancelled()?;
        self.write_to_terminal(bytes).await?;
        self.advance(delay).await
    }

    /// Let `delay` of logical time pass, capturing every tick that falls due
    /// while recording.
    ///
    /// Time passes in slices of at most one frame interval, with a
    /// cancellation check after each, hidden or not.
    pub async fn advance(&mut self, delay: Duration) -> Result<(), CommandError> {
        self.check_cancelled()?;
        let mut remaining = delay;
        while self.recorder.is_recording() {
            let until_tick = self.recorder.until_next_tick();
            if until_tick >= remaining {
                break;
            }
            self.pass(until_tick).await;
            remaining -= until_tick;
            self.check_cancelled()?;
            self.ensure_terminal().await?;
            if let Some(terminal) = self.terminal.as_deref_mut() {
                self.recorder.tick(terminal).map_err(CommandError::capture)?;
            }
        }
        let slice = self.settings.frame_interval();
        while !remaining.is_zero() {
            let step = remaining.min(slice);
            self.pass(step).await;
            remaining -= step;
            self.check_cancelled()?;
        }
        Ok(())
    }

    async fn pass(&mut self, duration: Duration) {
        self.sleeper.sleep(duration).await;
        self.elapsed += duration;
        self.recorder.elapse(duration);
    }

    /// Current screen, without recording it.
    pub async fn snapshot(&mut self) -> Result<Screen, CommandError> {
        self.ensure_terminal().await?;
        self.live_terminal()?
            .snapshot()
            .map_err(CommandError::capture)
    }

    /// Capture the screen now and tag the frame for `path`.
    pub async fn screenshot(&mut self, path: PathBuf) -> Result<(), CommandError> {
        self.ensure_terminal().await?;
        if let Some(terminal) = self.terminal.as_deref_mut() {
            self.recorder
                .capture_now(terminal, FrameOrigin::Screenshot(path))
                .map_err(CommandError::capture)?;
        }
        Ok(())
    }

    /// Resize a running session to the current settings.
    pub fn resize_terminal(&mut self) -> Result<(), CommandError> {
        let (rows, cols) = self.settings.terminal_size();
        if let Some(terminal) = self.terminal.as_deref_mut() {
            debug!(rows, cols, "resizing terminal session");
            terminal.resize(rows, cols).map_err(CommandError::session)?;
        }
        Ok(())
    }

    /// Closing frame so the final state of the screen is part of the output.
    pub(crate) fn finish(&mut self) -> Result<(), CommandError> {
        if !self.recorder.is_recording() {
            return Ok(());
        }
        if let Some(terminal) = self.terminal.as_deref_mut() {
            self.recorder
                .capture_now(terminal, FrameOrigin::Tick)
                .map_err(CommandError::capture)?;
        }
        Ok(())
    }

    /// Drop the session, ending the child program.
    pub(crate) fn release(&mut self) {
        if self.terminal.take().is_some() {
            debug!("terminal session released");
        }
    }

    pub(crate) fn take_frames(&mut self) -> FrameSequence {
        let fresh = Recorder::new(self.settings.frame_interval());
        std::mem::replace(&mut self.recorder, fresh).into_frames()
    }
}

/// Executes one family of [`Command`] variants.
///
/// Register every implementation in [`crate::commands::HANDLERS`], once per
/// [`CommandKind`] it accepts.
#[async_trait(?Send)]
pub trait CommandHandler: Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError>;
}

/// A context over a [`crate::terminal::Loopback`] session with an instant
/// sleeper, for handler tests.
#[cfg(test)]
pub(crate) fn test_context() -> (Context, Arc<crate::sleeper::InstantSleeper>) {
    let sleeper = Arc::new(crate::sleeper::InstantSleeper::new());
    let ctx = Context::new(
        crate::terminal::Loopback::factory(),
        sleeper.clone(),
        Arc::new(AtomicBool::new(false)),
        Duration::ZERO,
    );
    (ctx, sleeper)
}

/// The error a handler returns when dispatch routed it a variant it does not
/// own. Only reachable if the registry is out of step with [`CommandKind`].
pub(crate) fn unexpected(handler: &dyn CommandHandler, command: &Command) -> CommandError {
    CommandError::argument(format!(
        "{} handler cannot execute {}",
        handler.name(),
        command.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_count() {
        assert_eq!(CommandKind::ALL.len(), CommandKind::COUNT);
    }

    #[test]
    fn test_keywords_round_trip() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_keyword(kind.keyword()), Some(*kind));
        }
        assert_eq!(CommandKind::from_keyword("type"), None);
    }

    #[test]
    fn test_map_text_skips_wait_patterns() {
        let wait = Command::Wait(WaitFor {
            pattern: Some("${{X}}".to_string()),
            ..WaitFor::default()
        });
        assert_eq!(wait.map_text(|_| "changed".to_string()), wait);

        let typed = Command::Type {
            text: "a".to_string(),
            speed: None,
        };
        assert_eq!(
            typed.map_text(|t| t.to_uppercase()),
            Command::Type {
                text: "A".to_string(),
                speed: None
            }
        );
    }

    #[test]
    fn test_named_keys_ignore_case() {
        assert_eq!(NamedKey::from_name("enter"), Some(NamedKey::Enter));
        assert_eq!(NamedKey::from_name("PageDown"), Some(NamedKey::PageDown));
        assert_eq!(NamedKey::from_name("Hyper"), None);
    }
}
