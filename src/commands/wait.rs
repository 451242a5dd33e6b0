//! [`Sleep`] and [`Wait`]: letting time pass.
//!
//! Script syntax:
//! - `Sleep 500ms`, `Sleep 1.5s`, `Sleep 2`
//! - `Wait`, `Wait /ready/`, `Wait+Screen@10s /done/`

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::command::{Command, CommandHandler, Context, WaitScope, unexpected};
use crate::error::CommandError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pauses for a fixed duration. The recording keeps running.
pub struct Sleep;

/// Pauses until the last line (or the whole screen) matches a regex.
pub struct Wait;

#[async_trait(?Send)]
impl CommandHandler for Sleep {
    fn name(&self) -> &'static str {
        "sleep"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Sleep(duration) = command else {
            return Err(unexpected(self, command));
        };
        ctx.advance(*duration).await
    }
}

#[async_trait(?Send)]
impl CommandHandler for Wait {
    fn name(&self) -> &'static str {
        "wait"
    }

    async fn execute(&self, command: &Command, ctx: &mut Context) -> Result<(), CommandError> {
        let Command::Wait(wait) = command else {
            return Err(unexpected(self, command));
        };
        let pattern = wait
            .pattern
            .clone()
            .unwrap_or_else(|| ctx.settings().wait_pattern.clone());
        let timeout = wait.timeout.unwrap_or(ctx.settings().wait_timeout);
        let regex = Regex::new(&pattern)
            .map_err(|err| CommandError::argument(format!("invalid wait pattern /{pattern}/: {err}")))?;

        let mut waited = Duration::ZERO;
        loop {
            let screen = ctx.snapshot().await?;
            let matched = match wait.scope {
                WaitScope::Line => regex.is_match(screen.last_line()),
                WaitScope::Screen => regex.is_match(&screen.text()),
            };
            if matched {
                debug!(%pattern, ?waited, "wait satisfied");
                return Ok(());
            }
            if waited >= timeout {
                return Err(CommandError::Timeout { pattern, timeout });
            }
            ctx.advance(POLL_INTERVAL).await?;
            waited += POLL_INTERVAL;
        }
    }
}
