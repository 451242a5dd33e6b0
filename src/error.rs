//! Error types surfaced by parsing, execution and output assembly.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::command::CommandKind;
use crate::theme::ThemeError;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for a tape run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("command {index} ({kind}): {source}")]
    Command {
        index: usize,
        kind: CommandKind,
        #[source]
        source: CommandError,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("engine has already executed a tape")]
    EngineReused,
}

impl Error {
    /// Position of the offending command in the tape, if the error came from
    /// dispatch.
    #[must_use]
    pub fn command_index(&self) -> Option<usize> {
        match self {
            Self::Command { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Raised before execution starts; never reaches the engine.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: unknown command: {text}")]
    UnknownCommand { line: usize, text: String },

    #[error("line {line}: unknown setting: {name}")]
    UnknownSetting { line: usize, name: String },

    #[error("line {line}: {message}")]
    Invalid { line: usize, message: String },

    #[error("failed to read tape {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub(crate) fn invalid(line: usize, message: impl Into<String>) -> Self {
        Self::Invalid {
            line,
            message: message.into(),
        }
    }
}

/// Failure of a single dispatched command. The engine wraps it with the
/// command's position in [`Error::Command`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Argument(String),

    #[error(transparent)]
    Theme(#[from] ThemeError),

    #[error("{0}")]
    Precondition(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("terminal session failed: {0}")]
    Session(String),

    #[error("timed out after {timeout:?} waiting for /{pattern}/")]
    Timeout { pattern: String, timeout: Duration },

    #[error("interrupted")]
    Cancelled,

    #[error("{path}: command {index} ({kind}): {source}")]
    Sourced {
        path: String,
        index: usize,
        kind: CommandKind,
        #[source]
        source: Box<CommandError>,
    },
}

impl CommandError {
    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    pub(crate) fn session(err: anyhow::Error) -> Self {
        Self::Session(format!("{err:#}"))
    }

    pub(crate) fn capture(err: anyhow::Error) -> Self {
        Self::Capture(format!("{err:#}"))
    }
}

/// Failure while turning frames into artifacts.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder {program} not found in $PATH")]
    MissingEncoder { program: String },

    #[error("{program} failed (exit={code:?}): {diagnostic}")]
    Failed {
        program: String,
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("output {path} was not produced")]
    MissingArtifact { path: PathBuf },

    #[error("output {path} is empty")]
    EmptyArtifact { path: PathBuf },

    #[error("no frames were recorded for {path}")]
    NoFrames { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
