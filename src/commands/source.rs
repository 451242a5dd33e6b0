//! [`Source`] command: runs another tape in place.
//!
//! Script syntax: `Source setup.tape`

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{Command, CommandHandler, CommandKind, Context, unexpected};
use crate::error::CommandError;
use crate::parser::parse_file;

/// Parses the named tape and executes its commands against the current
/// session. A sourced tape may not source further tapes, and its `Output`
/// directives are ignored.
pub struct Source;

#[async_trait(?Send)]
impl CommandHandler for Source {
    fn name(&self) -> &'static str {
        "source"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Source(path) = command else {
            return Err(unexpected(self, command));
        };
        if ctx.sourcing {
            return Err(CommandError::argument("nested Source is not allowed"));
        }
        let tape = parse_file(path)
            .map_err(|err| CommandError::argument(format!("cannot source {path}: {err}")))?;
        if tape.iter().any(|cmd| cmd.kind() == CommandKind::Source) {
            return Err(CommandError::argument(format!(
                "{path}: nested Source is not allowed"
            )));
        }
        info!(%path, commands = tape.len(), "sourcing tape");

        ctx.sourcing = true;
        let result = run_sourced(path, tape.commands(), ctx).await;
        ctx.sourcing = false;
        result
    }
}

async fn run_sourced(
    path: &str,
    commands: &[Command],
    ctx: &mut Context,
) -> Result<(), CommandError> {
    for (index, command) in commands.iter().enumerate() {
        if command.kind() == CommandKind::Output {
            debug!(%path, index, "skipping Output in sourced tape");
            continue;
        }
        let command = ctx.interpolate(command);
        super::dispatch(&command, ctx)
            .await
            .map_err(|source| CommandError::Sourced {
                path: path.to_string(),
                index,
                kind: command.kind(),
                source: Box::new(source),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_context;
    use std::io::Write;

    fn tape_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".tape").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_runs_commands_in_place() {
        let file = tape_file("Output skipped.gif\nType \"ls\"\nEnter\n");
        let (mut ctx, _) = test_context();
        let path = file.path().to_string_lossy().into_owned();
        Source
            .execute(&Command::Source(path), &mut ctx)
            .await
            .unwrap();

        assert!(ctx.settings().outputs.is_empty());
        let screen = ctx.snapshot().await.unwrap();
        assert_eq!(screen.text(), "> ls\n>");
        assert!(!ctx.sourcing);
    }

    #[tokio::test]
    async fn test_rejects_nested_source() {
        let file = tape_file("Source other.tape\n");
        let (mut ctx, _) = test_context();
        let path = file.path().to_string_lossy().into_owned();
        let err = Source
            .execute(&Command::Source(path), &mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nested Source"));
    }

    #[tokio::test]
    async fn test_reports_position_inside_sourced_tape() {
        let file = tape_file("Type \"a\"\nSet Framerate 0\n");
        let (mut ctx, _) = test_context();
        let path = file.path().to_string_lossy().into_owned();
        let err = Source
            .execute(&Command::Source(path), &mut ctx)
            .await
            .unwrap_err();
        match err {
            CommandError::Sourced { index, kind, .. } => {
                assert_eq!(index, 1);
                assert_eq!(kind, CommandKind::Set);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ctx.sourcing);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let (mut ctx, _) = test_context();
        let err = Source
            .execute(&Command::Source("/no/such/file.tape".to_string()), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Argument(_)));
    }
}
