//! [`Require`] command: fails the tape early if a program is missing.
//!
//! Script syntax: `Require git`

use async_trait::async_trait;
use tracing::debug;

use crate::command::{Command, CommandHandler, Context, unexpected};
use crate::error::CommandError;

pub struct Require;

#[async_trait(?Send)]
impl CommandHandler for Require {
    fn name(&self) -> &'static str {
        "require"
    }

    async fn execute(&self, command: &Command, _ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Require(program) = command else {
            return Err(unexpected(self, command));
        };
        match which::which(program) {
            Ok(path) => {
                debug!(program, path = %path.display(), "requirement found");
                Ok(())
            }
            Err(_) => Err(CommandError::Precondition(format!(
                "{program} not found in $PATH"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_context;

    #[tokio::test]
    async fn test_present_program() {
        let (mut ctx, _) = test_context();
        Require
            .execute(&Command::Require("sh".to_string()), &mut ctx)
            .await
            .unwrap();
        assert!(!ctx.terminal_started());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let (mut ctx, _) = test_context();
        let err = Require
            .execute(
                &Command::Require("tapereel-no-such-program".to_string()),
                &mut ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Precondition(_)));
        assert_eq!(
            err.to_string(),
            "tapereel-no-such-program not found in $PATH"
        );
    }
}
