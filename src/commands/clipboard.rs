//! [`Copy`] and [`Paste`] over a clipboard private to the run.
//!
//! Script syntax: `Copy "text"`, `Paste`

use async_trait::async_trait;

use crate::command::{Command, CommandHandler, Context, unexpected};
use crate::error::CommandError;

pub struct Copy;

/// Types the clipboard contents as if pasted.
pub struct Paste;

#[async_trait(?Send)]
impl CommandHandler for Copy {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Copy(text) = command else {
            return Err(unexpected(self, command));
        };
        ctx.set_clipboard(text.as_str());
        Ok(())
    }
}

#[async_trait(?Send)]
impl CommandHandler for Paste {
    fn name(&self) -> &'static str {
        "paste"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        if !matches!(command, Command::Paste) {
            return Err(unexpected(self, command));
        }
        let text = ctx.clipboard().to_string();
        let delay = ctx.settings().typing_speed;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            ctx.press(ch.encode_utf8(&mut buf).as_bytes(), delay).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_context;

    #[tokio::test]
    async fn test_copy_then_paste() {
        let (mut ctx, _) = test_context();
        Copy.execute(&Command::Copy("ls -la".to_string()), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.clipboard(), "ls -la");
        assert!(!ctx.terminal_started());

        Paste.execute(&Command::Paste, &mut ctx).await.unwrap();
        let screen = ctx.snapshot().await.unwrap();
        assert_eq!(screen.last_line(), "> ls -la");
    }

    #[tokio::test]
    async fn test_paste_empty_clipboard_types_nothing() {
        let (mut ctx, _) = test_context();
        Paste.execute(&Command::Paste, &mut ctx).await.unwrap();
        assert!(!ctx.terminal_started());
    }
}
