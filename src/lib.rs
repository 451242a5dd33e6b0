//! # Tapereel
//!
//! Replay a terminal tape against a live shell and record it.
//!
//! A tape is a small script of keystrokes, pauses and output directives.
//! Tapereel types it into a shell running in a PTY, captures the screen at a
//! fixed frame rate, and writes the result as an asciicast, a plain-text
//! golden file, or (through `agg` and `ffmpeg`) a GIF, MP4 or WebM.
//!
//! ## Quick start
//!
//! ```no_run
//! use tapereel::{Engine, ExternalEncoder, RunOptions, parse_str, record_tape};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tape = parse_str(r#"
//! Output demo.gif
//! Set Theme "Dracula"
//! Type "echo hello"
//! Enter
//! Sleep 1s
//! "#)?;
//!
//!     let mut engine = Engine::new(RunOptions::default());
//!     let written = record_tape(&mut engine, &tape, &ExternalEncoder::default(), &[]).await?;
//!     println!("{written:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Tape syntax
//!
//! | Command | Description |
//! |---------|-------------|
//! | `Type "text"` | Type text one character at a time (`Type@10ms` to override the speed) |
//! | `Enter`, `Tab 2`, `Backspace@100ms 3` | Press a key, optionally repeated |
//! | `Ctrl+C`, `Alt+Enter`, `Shift+Tab` | Press a key combination |
//! | `Sleep 500ms` | Let time pass (`ms`, `s`, or bare seconds) |
//! | `Wait /regex/` | Wait until the last line matches (`Wait+Screen@10s` for the whole screen) |
//! | `Set Name value` | Change a setting (`FontSize`, `Theme`, `TypingSpeed`, …) |
//! | `Output demo.gif` | Add an artifact (`.gif`, `.mp4`, `.webm`, `.cast`, `.txt`) |
//! | `Screenshot shot.png` | Capture the current screen (`.png` or `.txt`) |
//! | `Hide` / `Show` | Pause and resume the recording |
//! | `Copy "text"` / `Paste` | Use the run's clipboard |
//! | `Env KEY value` | Set a variable for the shell and for `${{KEY}}` |
//! | `Require program` | Fail early unless `program` is on `PATH` |
//! | `Source other.tape` | Run another tape in place |
//! | `# comment` | Full-line or inline comment |
//!
//! ## Testing without a shell
//!
//! [`terminal::Loopback`] echoes keystrokes through the same screen model
//! and [`sleeper::InstantSleeper`] makes logical time free, so a tape runs
//! deterministically in microseconds:
//!
//! ```
//! use std::sync::Arc;
//! use tapereel::{Engine, RunOptions, parse_str};
//! use tapereel::sleeper::InstantSleeper;
//! use tapereel::terminal::Loopback;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let tape = parse_str("Type \"ls\"\nEnter\n").unwrap();
//! let mut engine = Engine::new(RunOptions::default())
//!     .with_terminal(Loopback::factory())
//!     .with_sleeper(Arc::new(InstantSleeper::new()));
//! let recording = engine.execute(&tape).await.unwrap();
//! assert_eq!(recording.frames.frames().last().unwrap().screen.text(), "> ls\n>");
//! # });
//! ```

pub mod asciicast;
pub mod assembler;
pub mod command;
pub mod commands;
pub mod engine;
pub mod error;
pub mod interpolate;
pub mod parser;
pub mod pty;
pub mod recorder;
pub mod settings;
pub mod sleeper;
pub mod telemetry;
pub mod terminal;
pub mod theme;

pub use assembler::{Encoder, ExternalEncoder, assemble, record_tape};
pub use command::{Command, CommandHandler, CommandKind, Context, Tape};
pub use engine::{AbortPolicy, Aborted, Engine, EngineState, Recording, RunOptions};
pub use error::{CommandError, EncodeError, Error, ParseError, Result};
pub use interpolate::interpolate;
pub use parser::{parse_file, parse_str};
pub use recorder::{Frame, FrameOrigin, FrameSequence, Recorder};
pub use settings::{OutputFormat, OutputTarget, SettingName, Settings};
pub use theme::{Theme, ThemeError};
