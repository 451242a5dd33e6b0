use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{CommandKind, Context, Tape};
use crate::commands::dispatch;
use crate::error::{CommandError, Error};
use crate::pty::PtyTerminal;
use crate::recorder::FrameSequence;
use crate::settings::Settings;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::terminal::TerminalFactory;

/// Lifecycle of an [`Engine`]. One engine runs one tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// What an aborted run hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbortPolicy {
    /// Drop everything captured so far.
    #[default]
    Discard,
    /// Return the frames captured before the failure.
    EmitPartial,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub abort_policy: AbortPolicy,
    /// Time a new shell gets to print its first prompt.
    pub startup_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            abort_policy: AbortPolicy::Discard,
            startup_delay: Duration::from_millis(100),
        }
    }
}

/// A finished (or partially finished) run.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Settings as they stood when the run ended, outputs included.
    pub settings: Settings,
    pub frames: FrameSequence,
    /// Logical script time, hidden stretches included.
    pub elapsed: Duration,
}

/// A run that stopped at a failing command.
#[derive(Debug, Error)]
#[error("tape aborted")]
pub struct Aborted {
    #[source]
    pub error: Error,
    /// Present only under [`AbortPolicy::EmitPartial`].
    pub partial: Option<Recording>,
}

/// Executes a [`Tape`] against a terminal session, capturing frames as it
/// goes.
///
/// The default session is a real shell in a PTY and time passes on the tokio
/// clock. Tests and dry runs swap in [`crate::terminal::Loopback`] and
/// [`crate::sleeper::InstantSleeper`].
pub struct Engine {
    options: RunOptions,
    state: EngineState,
    factory: Option<TerminalFactory>,
    sleeper: Arc<dyn Sleeper>,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            state: EngineState::Idle,
            factory: Some(PtyTerminal::factory()),
            sleeper: Arc::new(TokioSleeper),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use `factory` to start the session instead of a PTY shell.
    pub fn with_terminal(mut self, factory: TerminalFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Setting the flag aborts the run at the next command or capture tick.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn abort_policy(&self) -> AbortPolicy {
        self.options.abort_policy
    }

    /// Run every command of `tape` in order.
    ///
    /// The first failing command stops the run; the error carries its
    /// 0-based position. The session is released either way.
    pub async fn execute(&mut self, tape: &Tape) -> Result<Recording, Aborted> {
        let Some(factory) = self.factory.take().filter(|_| self.state == EngineState::Idle) else {
            return Err(Aborted {
                error: Error::EngineReused,
                partial: None,
            });
        };
        let mut ctx = Context::new(
            factory,
            self.sleeper.clone(),
            self.cancel.clone(),
            self.options.startup_delay,
        );
        self.state = EngineState::Running;
        info!(commands = tape.len(), "executing tape");

        for (index, command) in tape.iter().enumerate() {
            let kind = command.kind();
            if let Err(source) = ctx.check_cancelled() {
                return Err(self.abort(&mut ctx, index, kind, source));
            }
            let command = ctx.interpolate(command);
            debug!(index, %kind, "dispatching command");
            if let Err(source) = dispatch(&command, &mut ctx).await {
                return Err(self.abort(&mut ctx, index, kind, source));
            }
        }

        if let Err(source) = ctx.finish() {
            let index = tape.len().saturating_sub(1);
            let kind = tape
                .commands()
                .last()
                .map_or(CommandKind::Show, |command| command.kind());
            return Err(self.abort(&mut ctx, index, kind, source));
        }

        let recording = Self::collect(&mut ctx);
        self.state = EngineState::Completed;
        info!(
            frames = recording.frames.len(),
            elapsed = ?recording.elapsed,
            "tape completed"
        );
        Ok(recording)
    }

    fn abort(
        &mut self,
        ctx: &mut Context,
        index: usize,
        kind: CommandKind,
        source: CommandError,
    ) -> Aborted {
        warn!(index, %kind, error = %source, "tape aborted");
        let partial = match self.options.abort_policy {
            AbortPolicy::Discard => {
                ctx.release();
                None
            }
            AbortPolicy::EmitPartial => Some(Self::collect(ctx)),
        };
        self.state = EngineState::Aborted;
        Aborted {
            error: Error::Command {
                index,
                kind,
                source,
            },
            partial,
        }
    }

    fn collect(ctx: &mut Context) -> Recording {
        ctx.release();
        Recording {
            settings: ctx.settings().clone(),
            frames: ctx.take_frames(),
            elapsed: ctx.elapsed(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(RunOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::recorder::FrameOrigin;
    use crate::sleeper::InstantSleeper;
    use crate::terminal::Loopback;
    use crate::theme::Theme;
    use std::io::Write;
    use std::sync::atomic::Ordering;

    fn engine(policy: AbortPolicy) -> Engine {
        Engine::new(RunOptions {
            abort_policy: policy,
            startup_delay: Duration::ZERO,
        })
        .with_terminal(Loopback::factory())
        .with_sleeper(Arc::new(InstantSleeper::new()))
    }

    async fn run(script: &str) -> Result<Recording, Aborted> {
        engine(AbortPolicy::Discard)
            .execute(&parse_str(script).unwrap())
            .await
    }

    #[tokio::test]
    async fn test_records_typed_command_with_theme() {
        let recording = run("Set Theme \"Andromeda\"\nType \"echo hi\"\nEnter\nSleep 100ms\n")
            .await
            .unwrap();
        assert!(!recording.frames.is_empty());
        assert_ne!(recording.settings.theme, Theme::default());
        let last = recording.frames.frames().last().unwrap();
        assert_eq!(last.screen.text(), "> echo hi\n>");
    }

    #[tokio::test]
    async fn test_timestamps_are_monotonic() {
        let recording = run("Type \"abc\"\nSleep 1s\nType@10ms \"def\"\nBackspace 2\n")
            .await
            .unwrap();
        assert!(
            recording
                .frames
                .frames()
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
        assert_eq!(
            recording.elapsed,
            Duration::from_millis(3 * 50 + 1000 + 3 * 10 + 2 * 50)
        );
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let mut engine = engine(AbortPolicy::Discard);
        assert_eq!(engine.state(), EngineState::Idle);
        engine.execute(&parse_str("Sleep 10ms").unwrap()).await.unwrap();
        assert_eq!(engine.state(), EngineState::Completed);

        let again = engine.execute(&parse_str("Sleep 10ms").unwrap()).await;
        assert!(matches!(again, Err(Aborted { error: Error::EngineReused, .. })));
    }

    #[tokio::test]
    async fn test_bad_theme_aborts_at_its_index() {
        let mut engine = engine(AbortPolicy::Discard);
        let tape = parse_str("Type \"x\"\nSet Theme \"foobar\"\nType \"never\"\n").unwrap();
        let aborted = engine.execute(&tape).await.unwrap_err();
        assert_eq!(aborted.error.command_index(), Some(1));
        assert!(aborted.partial.is_none());
        assert_eq!(engine.state(), EngineState::Aborted);
    }

    #[tokio::test]
    async fn test_emit_partial_keeps_frames() {
        let mut engine = engine(AbortPolicy::EmitPartial);
        let tape = parse_str("Type \"ls\"\nSleep 100ms\nRequire tapereel-no-such-program\n").unwrap();
        let aborted = engine.execute(&tape).await.unwrap_err();
        assert_eq!(aborted.error.command_index(), Some(2));
        assert!(matches!(
            aborted.error,
            Error::Command {
                kind: CommandKind::Require,
                source: CommandError::Precondition(_),
                ..
            }
        ));
        let partial = aborted.partial.unwrap();
        assert!(!partial.frames.is_empty());
        assert_eq!(partial.frames.frames().last().unwrap().screen.last_line(), "> ls");
    }

    #[tokio::test]
    async fn test_wait_success_and_timeout() {
        run("Type \"x\"\nEnter\nWait@100ms /^>$/\n").await.unwrap();

        let aborted = run("Wait@50ms /never/\n").await.unwrap_err();
        assert!(matches!(
            aborted.error,
            Error::Command {
                index: 0,
                source: CommandError::Timeout { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_hidden_commands_leave_no_frames() {
        let shown = run("Sleep 200ms\n").await.unwrap();
        let hidden = run("Hide\nType \"secret\"\nSleep 5s\nShow\nSleep 200ms\n")
            .await
            .unwrap();
        assert_eq!(hidden.frames.len(), shown.frames.len());
        let last = hidden.frames.frames().last().unwrap();
        assert_eq!(last.timestamp, Duration::from_millis(200));
        assert_eq!(last.screen.last_line(), "> secret");
    }

    #[tokio::test]
    async fn test_screenshot_and_closing_frame() {
        let recording = run("Type \"a\"\nScreenshot shot.txt\n").await.unwrap();
        assert_eq!(recording.frames.screenshots().count(), 1);
        let last = recording.frames.frames().last().unwrap();
        assert_eq!(last.origin, FrameOrigin::Tick);
    }

    #[tokio::test]
    async fn test_copy_paste_and_env_interpolation() {
        let recording = run("Env NAME world\nCopy \"hello ${{NAME}}\"\nPaste\n")
            .await
            .unwrap();
        let last = recording.frames.frames().last().unwrap();
        assert_eq!(last.screen.last_line(), "> hello world");
        assert_eq!(recording.settings.env.get("NAME").unwrap(), "world");
    }

    #[tokio::test]
    async fn test_source_runs_inline() {
        let mut file = tempfile::Builder::new().suffix(".tape").tempfile().unwrap();
        writeln!(file, "Output ignored.gif\nType \"from source\"").unwrap();
        let script = format!("Source {}\nEnter\n", file.path().display());
        let recording = run(&script).await.unwrap();
        assert!(recording.settings.outputs.is_empty());
        let last = recording.frames.frames().last().unwrap();
        assert_eq!(last.screen.text(), "> from source\n>");
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_command() {
        let mut engine = engine(AbortPolicy::Discard);
        engine.cancel_handle().store(true, Ordering::SeqCst);
        let aborted = engine
            .execute(&parse_str("Type \"x\"").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            aborted.error,
            Error::Command {
                index: 0,
                source: CommandError::Cancelled,
                ..
            }
        ));
    }

    /// Raises the cancel flag once it has been asked to wait `after`.
    struct CancellingSleeper {
        cancel: Arc<AtomicBool>,
        after: Duration,
        slept: std::sync::Mutex<Duration>,
    }

    #[async_trait::async_trait]
    impl Sleeper for CancellingSleeper {
        async fn sleep(&self, duration: Duration) {
            let mut slept = self.slept.lock().unwrap();
            *slept += duration;
            if *slept >= self.after {
                self.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_hidden_sleep() {
        let engine = engine(AbortPolicy::Discard);
        let sleeper = Arc::new(CancellingSleeper {
            cancel: engine.cancel_handle(),
            after: Duration::from_millis(200),
            slept: std::sync::Mutex::new(Duration::ZERO),
        });
        let mut engine = engine.with_sleeper(sleeper.clone());

        let tape = parse_str("Hide\nSleep 60s\nShow\n").unwrap();
        let aborted = engine.execute(&tape).await.unwrap_err();
        assert!(matches!(
            aborted.error,
            Error::Command {
                index: 1,
                kind: CommandKind::Sleep,
                source: CommandError::Cancelled,
            }
        ));
        assert!(*sleeper.slept.lock().unwrap() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_empty_tape_has_no_frames() {
        let recording = run("").await.unwrap();
        assert!(recording.frames.is_empty());
        assert_eq!(recording.elapsed, Duration::ZERO);
    }
}
