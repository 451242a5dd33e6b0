//! [`TypeText`] command: types text one character at a time.
//!
//! Script syntax: `Type "text here"` or `Type@100ms "slow"`

use crate::command::{Command, CommandHandler, Context, unexpected};
use crate::error::CommandError;
use async_trait::async_trait;

/// Sends `text` to the session one character per keystroke, waiting the
/// command's speed (or `TypingSpeed`) after each. The session's own echo
/// produces the visible output.
pub struct TypeText;

#[async_trait(?Send)]
impl CommandHandler for TypeText {
    fn name(&self) -> &'static str {
        "type"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Type { text, speed } = command else {
            return Err(unexpected(self, command));
        };
        let delay = speed.unwrap_or(ctx.settings().typing_speed);
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            // A newline in the text submits the line like Enter does.
            let ch = if ch == '\n' { '\r' } else { ch };
            ctx.press(ch.encode_utf8(&mut buf).as_bytes(), delay).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_context;
    use std::time::Duration;

    #[tokio::test]
    async fn test_types_each_character() {
        let (mut ctx, sleeper) = test_context();
        let cmd = Command::Type {
            text: "echo hi".to_string(),
            speed: None,
        };
        TypeText.execute(&cmd, &mut ctx).await.unwrap();

        let screen = ctx.snapshot().await.unwrap();
        assert_eq!(screen.last_line(), "> echo hi");
        assert_eq!(ctx.elapsed(), Duration::from_millis(50 * 7));
        assert_eq!(sleeper.total(), Duration::from_millis(50 * 7));
    }

    #[tokio::test]
    async fn test_speed_override_and_newline() {
        let (mut ctx, _) = test_context();
        let cmd = Command::Type {
            text: "a\nb".to_string(),
            speed: Some(Duration::from_millis(10)),
        };
        TypeText.execute(&cmd, &mut ctx).await.unwrap();

        let screen = ctx.snapshot().await.unwrap();
        assert_eq!(screen.text(), "> a\n> b");
        assert_eq!(ctx.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_rejects_other_commands() {
        let (mut ctx, _) = test_context();
        assert!(TypeText.execute(&Command::Paste, &mut ctx).await.is_err());
    }
}
