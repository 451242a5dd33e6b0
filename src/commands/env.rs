//! [`Env`] command: sets a variable for the session and for `${{…}}`.
//!
//! Script syntax: `Env GREETING "hello"`

use async_trait::async_trait;
use tracing::warn;

use crate::command::{Command, CommandHandler, Context, unexpected};
use crate::error::CommandError;

/// Records an environment override. The shell only sees it if the session
/// has not started yet; interpolation sees it from the next command on.
pub struct Env;

#[async_trait(?Send)]
impl CommandHandler for Env {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Env { key, value } = command else {
            return Err(unexpected(self, command));
        };
        if key.is_empty() || key.contains('=') {
            return Err(CommandError::argument(format!(
                "invalid environment variable name {key:?}"
            )));
        }
        if ctx.terminal_started() {
            warn!(%key, "Env after the session started only affects interpolation");
        }
        ctx.settings_mut().env.insert(key.clone(), value.clone());
        Ok(())
    }
}
