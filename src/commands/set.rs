//! [`Set`] command: changes a session setting.
//!
//! Script syntax: `Set FontSize 14`, `Set Theme "Dracula"`, `Set TypingSpeed 75ms`

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::command::{Command, CommandHandler, Context, unexpected};
use crate::error::CommandError;
use crate::settings::SettingName;

pub struct Set;

#[async_trait(?Send)]
impl CommandHandler for Set {
    fn name(&self) -> &'static str {
        "set"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Set { setting, value } = command else {
            return Err(unexpected(self, command));
        };
        if *setting == SettingName::Shell && ctx.terminal_started() {
            return Err(CommandError::argument(format!(
                "invalid `Set Shell {value}`: the shell is already running"
            )));
        }

        let applied = ctx.settings.apply(*setting, value);
        if let Err(err) = &applied {
            warn!(%setting, %value, error = %err, "setting rejected");
        }
        applied?;
        debug!(%setting, %value, "setting applied");

        if *setting == SettingName::Framerate {
            let interval = ctx.settings.frame_interval();
            ctx.recorder.set_interval(interval);
        } else if setting.affects_geometry() {
            ctx.resize_terminal()?;
        }
        Ok(())
    }
}
