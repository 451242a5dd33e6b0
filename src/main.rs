use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use tapereel::sleeper::InstantSleeper;
use tapereel::telemetry::init_tracing;
use tapereel::terminal::Loopback;
use tapereel::{
    AbortPolicy, CommandKind, Engine, ExternalEncoder, OutputTarget, RunOptions, parse_file,
    record_tape, theme,
};
use tracing::{info, warn};

const DEFAULT_OUTPUT: &str = "out.gif";

#[derive(Parser, Debug)]
#[command(
    name = "tapereel",
    about = "Replay a terminal tape against a shell and record it",
    version
)]
struct Args {
    /// Path to the tape file
    #[arg(required_unless_present = "list_themes")]
    tape: Option<PathBuf>,

    /// Extra output file (.gif, .mp4, .webm, .cast, .txt); may be repeated
    #[arg(short, long)]
    output: Vec<PathBuf>,

    /// Still write whatever was recorded when a command fails
    #[arg(long)]
    emit_partial: bool,

    /// Echo keystrokes locally instead of starting a shell, without real waits
    #[arg(long)]
    dry_run: bool,

    /// Print the built-in theme names and exit
    #[arg(long)]
    list_themes: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// agg program used to render GIFs
    #[arg(long, default_value = "agg")]
    agg: PathBuf,

    /// ffmpeg program used for MP4, WebM and PNG
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(if args.verbose { "debug" } else { "info" });

    if args.list_themes {
        for name in theme::catalog() {
            println!("{name}");
        }
        return Ok(());
    }
    let Some(tape_path) = args.tape else {
        anyhow::bail!("no tape given");
    };

    let tape = parse_file(&tape_path)
        .with_context(|| format!("Failed to parse tape: {}", tape_path.display()))?;

    let mut extra = args
        .output
        .into_iter()
        .map(OutputTarget::recording)
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid --output")?;
    let declares_output = tape.iter().any(|cmd| cmd.kind() == CommandKind::Output);
    if extra.is_empty() && !declares_output && !args.dry_run {
        info!(path = DEFAULT_OUTPUT, "no Output in tape, using default");
        extra.push(OutputTarget::recording(DEFAULT_OUTPUT)?);
    }

    let options = RunOptions {
        abort_policy: if args.emit_partial {
            AbortPolicy::EmitPartial
        } else {
            AbortPolicy::Discard
        },
        ..RunOptions::default()
    };
    let mut engine = Engine::new(options);
    if args.dry_run {
        engine = engine
            .with_terminal(Loopback::factory())
            .with_sleeper(Arc::new(InstantSleeper::new()));
    }

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current step");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let encoder = ExternalEncoder {
        agg: args.agg,
        ffmpeg: args.ffmpeg,
    };
    let written = record_tape(&mut engine, &tape, &encoder, &extra)
        .await
        .with_context(|| format!("Failed to record {}", tape_path.display()))?;

    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
