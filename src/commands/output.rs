//! [`Output`] and [`Screenshot`]: where frames end up.
//!
//! Script syntax: `Output demo.gif`, `Screenshot step.png`

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::command::{Command, CommandHandler, Context, unexpected};
use crate::error::CommandError;
use crate::settings::{OutputFormat, OutputTarget};

/// Registers an artifact to render once the tape finishes. The format comes
/// from the extension.
pub struct Output;

/// Captures the current screen as a still image or text file.
pub struct Screenshot;

#[async_trait(?Send)]
impl CommandHandler for Output {
    fn name(&self) -> &'static str {
        "output"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Output(path) = command else {
            return Err(unexpected(self, command));
        };
        let target = OutputTarget::recording(path)?;
        info!(path = %target.path.display(), format = ?target.format, "output registered");
        ctx.settings_mut().add_output(target);
        Ok(())
    }
}

#[async_trait(?Send)]
impl CommandHandler for Screenshot {
    fn name(&self) -> &'static str {
        "screenshot"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Screenshot(path) = command else {
            return Err(unexpected(self, command));
        };
        let path = PathBuf::from(path);
        match OutputFormat::from_path(&path) {
            Some(format) if format.is_still() => ctx.screenshot(path).await,
            _ => Err(CommandError::argument(format!(
                "unsupported screenshot {}: expected .png or .txt",
                path.display()
            ))),
        }
    }
}
