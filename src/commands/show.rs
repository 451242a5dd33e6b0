//! [`Hide`] and [`Show`]: pausing and resuming the recording.
//!
//! Commands between `Hide` and `Show` still run against the session, but no
//! frames are captured and the recording timeline stands still.

use async_trait::async_trait;
use tracing::debug;

use crate::command::{Command, CommandHandler, Context, unexpected};
use crate::error::CommandError;

pub struct Hide;

pub struct Show;

#[async_trait(?Send)]
impl CommandHandler for Hide {
    fn name(&self) -> &'static str {
        "hide"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        if !matches!(command, Command::Hide) {
            return Err(unexpected(self, command));
        }
        debug!(at = ?ctx.elapsed(), "recording hidden");
        ctx.set_recording(false);
        Ok(())
    }
}

#[async_trait(?Send)]
impl CommandHandler for Show {
    fn name(&self) -> &'static str {
        "show"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        if !matches!(command, Command::Show) {
            return Err(unexpected(self, command));
        }
        debug!(at = ?ctx.elapsed(), "recording shown");
        ctx.set_recording(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_context;
    use std::time::Duration;

    #[tokio::test]
    async fn test_hidden_time_captures_nothing() {
        let (mut ctx, _) = test_context();
        Hide.execute(&Command::Hide, &mut ctx).await.unwrap();
        ctx.advance(Duration::from_secs(1)).await.unwrap();
        assert!(ctx.recorder().frames().is_empty());
        assert_eq!(ctx.recorder().position(), Duration::ZERO);
        assert_eq!(ctx.elapsed(), Duration::from_secs(1));

        Show.execute(&Command::Show, &mut ctx).await.unwrap();
        ctx.advance(Duration::from_millis(30)).await.unwrap();
        let stamps: Vec<_> = ctx
            .recorder()
            .frames()
            .iter()
            .map(|frame| frame.timestamp)
            .collect();
        assert_eq!(stamps, vec![Duration::ZERO, Duration::from_millis(20)]);
    }

    #[tokio::test]
    async fn test_show_while_shown_is_harmless() {
        let (mut ctx, _) = test_context();
        Show.execute(&Command::Show, &mut ctx).await.unwrap();
        assert!(ctx.recorder().is_recording());
    }
}
