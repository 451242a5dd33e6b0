//! Command handlers and the registry that routes each [`CommandKind`] to one.

mod clipboard;
mod env;
mod keys;
mod output;
mod require;
mod set;
mod show;
mod source;
mod type_text;
mod wait;

pub use clipboard::{Copy, Paste};
pub use env::Env;
pub use keys::{ChordKeys, Keys, chord_bytes, key_bytes};
pub use output::{Output, Screenshot};
pub use require::Require;
pub use set::Set;
pub use show::{Hide, Show};
pub use source::Source;
pub use type_text::TypeText;
pub use wait::{Sleep, Wait};

use crate::command::{Command, CommandHandler, CommandKind, Context};
use crate::error::CommandError;

/// One entry per [`CommandKind`]. Adding a kind means adding its row here.
pub static HANDLERS: &[(CommandKind, &dyn CommandHandler)] = &[
    (CommandKind::Backspace, &Keys),
    (CommandKind::Delete, &Keys),
    (CommandKind::Insert, &Keys),
    (CommandKind::Ctrl, &ChordKeys),
    (CommandKind::Alt, &ChordKeys),
    (CommandKind::Down, &Keys),
    (CommandKind::Enter, &Keys),
    (CommandKind::Escape, &Keys),
    (CommandKind::Hide, &Hide),
    (CommandKind::Left, &Keys),
    (CommandKind::Output, &Output),
    (CommandKind::PageUp, &Keys),
    (CommandKind::PageDown, &Keys),
    (CommandKind::Right, &Keys),
    (CommandKind::Set, &Set),
    (CommandKind::Show, &Show),
    (CommandKind::Sleep, &Sleep),
    (CommandKind::Space, &Keys),
    (CommandKind::Tab, &Keys),
    (CommandKind::Type, &TypeText),
    (CommandKind::Up, &Keys),
    (CommandKind::Wait, &Wait),
    (CommandKind::Source, &Source),
    (CommandKind::Screenshot, &Screenshot),
    (CommandKind::Copy, &Copy),
    (CommandKind::Paste, &Paste),
    (CommandKind::Shift, &ChordKeys),
    (CommandKind::Env, &Env),
    (CommandKind::Require, &Require),
];

pub fn handler_for(kind: CommandKind) -> Option<&'static dyn CommandHandler> {
    HANDLERS
        .iter()
        .find(|(registered, _)| *registered == kind)
        .map(|(_, handler)| *handler)
}

/// Route `command` to its handler and run it.
pub async fn dispatch(command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
    let handler = handler_for(command.kind()).ok_or_else(|| {
        CommandError::argument(format!("no handler registered for {}", command.kind()))
    })?;
    handler.execute(command, ctx).await
}
