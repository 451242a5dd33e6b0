//! Turns a [`Recording`] into files on disk.
//!
//! Text formats (`.cast`, `.txt`/`.ascii`) are written directly. Everything
//! pixel-based goes through an [`Encoder`]: the frames are written as an
//! asciicast, rendered to GIF, and transcoded from there when another
//! container is wanted.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::asciicast::{self, Header, HeaderEnv, HeaderTheme};
use crate::command::Tape;
use crate::engine::{Aborted, Engine, Recording};
use crate::error::{EncodeError, Error};
use crate::recorder::Frame;
use crate::settings::{OutputFormat, OutputTarget, Settings};

const RULE_WIDTH: usize = 80;

// agg drops pauses longer than its idle limit; a tape's pauses are deliberate.
const IDLE_TIME_LIMIT: &str = "86400";

/// Renders pixel formats from an asciicast.
pub trait Encoder {
    /// Render `cast` as an animated GIF at `gif`.
    fn render_gif(&self, cast: &Path, gif: &Path, settings: &Settings) -> Result<(), EncodeError>;

    /// Convert a rendered GIF into `format` at `out`. For [`OutputFormat::Png`]
    /// only the first frame is kept.
    fn transcode(&self, gif: &Path, out: &Path, format: OutputFormat) -> Result<(), EncodeError>;
}

/// Runs `agg` for GIFs and `ffmpeg` for everything derived from them.
#[derive(Debug, Clone)]
pub struct ExternalEncoder {
    pub agg: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Default for ExternalEncoder {
    fn default() -> Self {
        Self {
            agg: PathBuf::from("agg"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl ExternalEncoder {
    fn run(program: &Path, args: Vec<OsString>) -> Result<(), EncodeError> {
        let name = program.display().to_string();
        let resolved = which::which(program)
            .map_err(|_| EncodeError::MissingEncoder { program: name.clone() })?;
        debug!(program = %resolved.display(), ?args, "running encoder");

        let output = Command::new(&resolved).args(&args).output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostic = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no diagnostic output")
            .trim()
            .to_string();
        Err(EncodeError::Failed {
            program: name,
            code: output.status.code(),
            diagnostic,
        })
    }
}

impl Encoder for ExternalEncoder {
    fn render_gif(&self, cast: &Path, gif: &Path, settings: &Settings) -> Result<(), EncodeError> {
        let args: Vec<OsString> = vec![
            "--theme".into(),
            settings.theme.agg_spec().into(),
            "--font-family".into(),
            settings.font_family.clone().into(),
            "--font-size".into(),
            settings.font_size.to_string().into(),
            "--line-height".into(),
            settings.line_height.to_string().into(),
            "--fps-cap".into(),
            settings.framerate.to_string().into(),
            "--idle-time-limit".into(),
            IDLE_TIME_LIMIT.into(),
            cast.into(),
            gif.into(),
        ];
        Self::run(&self.agg, args)
    }

    fn transcode(&self, gif: &Path, out: &Path, format: OutputFormat) -> Result<(), EncodeError> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.push("-i".into());
        args.push(gif.into());
        let codec: &[&str] = match format {
            OutputFormat::Mp4 => &[
                "-movflags",
                "faststart",
                "-pix_fmt",
                "yuv420p",
                "-vf",
                "scale=trunc(iw/2)*2:trunc(ih/2)*2",
            ],
            OutputFormat::Webm => &[
                "-c:v",
                "libvpx-vp9",
                "-pix_fmt",
                "yuv420p",
                "-b:v",
                "0",
                "-crf",
                "30",
            ],
            OutputFormat::Png => &["-frames:v", "1"],
            OutputFormat::Gif | OutputFormat::Cast | OutputFormat::Text => {
                return Err(EncodeError::Failed {
                    program: self.ffmpeg.display().to_string(),
                    code: None,
                    diagnostic: format!("cannot transcode to {format:?}"),
                });
            }
        };
        args.extend(codec.iter().map(OsString::from));
        args.push(out.into());
        Self::run(&self.ffmpeg, args)
    }
}

/// Write every registered output and every screenshot of `recording`.
///
/// Returns the paths written, in order. Stops at the first failure.
pub fn assemble(recording: &Recording, encoder: &dyn Encoder) -> Result<Vec<PathBuf>, EncodeError> {
    let scratch = tempfile::tempdir()?;
    let settings = &recording.settings;
    let ticks: Vec<&Frame> = recording.frames.ticks().collect();
    let mut written = Vec::new();

    for (index, target) in settings.outputs.iter().enumerate() {
        if ticks.is_empty() {
            return Err(EncodeError::NoFrames {
                path: target.path.clone(),
            });
        }
        let work = Scratch::new(scratch.path(), index);
        write_target(target, &ticks, settings, encoder, &work)?;
        written.push(verify(&target.path)?);
    }

    for (offset, (path, frame)) in recording.frames.screenshots().enumerate() {
        let target = OutputFormat::from_path(path).map(|format| OutputTarget {
            path: path.clone(),
            format,
        });
        match target {
            Some(target) if target.format.is_still() => {
                let work = Scratch::new(scratch.path(), settings.outputs.len() + offset);
                write_target(&target, &[frame], settings, encoder, &work)?;
                written.push(verify(path)?);
            }
            _ => warn!(path = %path.display(), "skipping screenshot with unsupported extension"),
        }
    }
    Ok(written)
}

fn write_target(
    target: &OutputTarget,
    frames: &[&Frame],
    settings: &Settings,
    encoder: &dyn Encoder,
    scratch: &Scratch<'_>,
) -> Result<(), EncodeError> {
    let path = &target.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    debug!(path = %path.display(), format = ?target.format, frames = frames.len(), "writing output");

    match target.format {
        OutputFormat::Cast => write_cast(path, frames, settings),
        OutputFormat::Text => write_text(path, frames),
        OutputFormat::Gif => {
            let cast = scratch.path(path, "cast");
            write_cast(&cast, frames, settings)?;
            encoder.render_gif(&cast, path, settings)
        }
        OutputFormat::Mp4 | OutputFormat::Webm | OutputFormat::Png => {
            // Stills only need the last screen.
            let frames = if target.format == OutputFormat::Png {
                &frames[frames.len().saturating_sub(1)..]
            } else {
                frames
            };
            let cast = scratch.path(path, "cast");
            let gif = scratch.path(path, "gif");
            write_cast(&cast, frames, settings)?;
            encoder.render_gif(&cast, &gif, settings)?;
            encoder.transcode(&gif, path, target.format)
        }
    }
}

/// Intermediate files for one artifact. `index` keeps two targets with the
/// same file name apart.
struct Scratch<'a> {
    dir: &'a Path,
    index: usize,
}

impl<'a> Scratch<'a> {
    fn new(dir: &'a Path, index: usize) -> Self {
        Self { dir, index }
    }

    fn path(&self, target: &Path, ext: &str) -> PathBuf {
        let stem = target
            .file_stem()
            .map_or_else(|| "output".into(), |s| s.to_string_lossy());
        self.dir.join(format!("{}-{stem}.{ext}", self.index))
    }
}

fn write_cast(path: &Path, frames: &[&Frame], settings: &Settings) -> Result<(), EncodeError> {
    let header = Header {
        version: 2,
        width: 0,
        height: 0,
        title: None,
        env: HeaderEnv {
            term: "xterm-256color".to_string(),
            shell: settings.shell.clone(),
        },
        theme: HeaderTheme::from_theme(&settings.theme),
    };
    let mut writer = asciicast::Writer::new(BufWriter::new(File::create(path)?));
    asciicast::write_frames(
        &mut writer,
        header,
        frames.iter().copied(),
        settings.playback_speed,
    )?;
    writer.into_inner().flush()?;
    Ok(())
}

/// One block per distinct screen, each followed by a rule line.
fn write_text(path: &Path, frames: &[&Frame]) -> Result<(), EncodeError> {
    let rule = "─".repeat(RULE_WIDTH);
    let mut out = String::new();
    let mut previous: Option<&Vec<String>> = None;
    for frame in frames {
        let lines = &frame.screen.lines;
        if previous == Some(lines) {
            continue;
        }
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&rule);
        out.push('\n');
        previous = Some(lines);
    }
    fs::write(path, out)?;
    Ok(())
}

fn verify(path: &Path) -> Result<PathBuf, EncodeError> {
    let metadata = fs::metadata(path).map_err(|_| EncodeError::MissingArtifact {
        path: path.to_path_buf(),
    })?;
    if metadata.len() == 0 {
        return Err(EncodeError::EmptyArtifact {
            path: path.to_path_buf(),
        });
    }
    info!(path = %path.display(), bytes = metadata.len(), "output written");
    Ok(path.to_path_buf())
}

/// Run `tape` on `engine` and write its outputs plus `extra_outputs`.
///
/// When the engine aborts under [`crate::AbortPolicy::EmitPartial`], the
/// partial recording is still assembled before the run's error is returned.
pub async fn record_tape(
    engine: &mut Engine,
    tape: &Tape,
    encoder: &dyn Encoder,
    extra_outputs: &[OutputTarget],
) -> Result<Vec<PathBuf>, Error> {
    let (mut recording, failure) = match engine.execute(tape).await {
        Ok(recording) => (recording, None),
        Err(Aborted {
            error,
            partial: Some(partial),
        }) => (partial, Some(error)),
        Err(aborted) => return Err(aborted.error),
    };
    for target in extra_outputs {
        recording.settings.add_output(target.clone());
    }

    let assembled = assemble(&recording, encoder);
    match failure {
        Some(error) => {
            match assembled {
                Ok(paths) => info!(artifacts = paths.len(), "partial recording written"),
                Err(err) => warn!(error = %err, "failed to write partial recording"),
            }
            Err(error)
        }
        None => Ok(assembled?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AbortPolicy, RunOptions};
    use crate::parser::parse_str;
    use crate::sleeper::InstantSleeper;
    use crate::terminal::Loopback;
    use std::cell::RefCell;
    use std::sync::Arc;
    use std::time::Duration;

    /// Writes a placeholder file for every request and remembers the calls.
    #[derive(Default)]
    struct FakeEncoder {
        calls: RefCell<Vec<String>>,
        casts: RefCell<Vec<PathBuf>>,
        empty: bool,
    }

    impl FakeEncoder {
        fn touch(&self, path: &Path) -> Result<(), EncodeError> {
            let body: &[u8] = if self.empty { b"" } else { b"GIF89a" };
            fs::write(path, body)?;
            Ok(())
        }
    }

    impl Encoder for FakeEncoder {
        fn render_gif(&self, cast: &Path, gif: &Path, _: &Settings) -> Result<(), EncodeError> {
            assert!(fs::metadata(cast).unwrap().len() > 0);
            self.casts.borrow_mut().push(cast.to_path_buf());
            self.calls.borrow_mut().push(format!("gif {}", gif.display()));
            self.touch(gif)
        }

        fn transcode(&self, _: &Path, out: &Path, format: OutputFormat) -> Result<(), EncodeError> {
            self.calls
                .borrow_mut()
                .push(format!("{format:?} {}", out.display()));
            self.touch(out)
        }
    }

    fn engine(policy: AbortPolicy) -> Engine {
        Engine::new(RunOptions {
            abort_policy: policy,
            startup_delay: Duration::ZERO,
        })
        .with_terminal(Loopback::factory())
        .with_sleeper(Arc::new(InstantSleeper::new()))
    }

    async fn record(script: &str) -> Recording {
        engine(AbortPolicy::Discard)
            .execute(&parse_str(script).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_text_and_cast_are_written_directly() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "Output {0}/golden.txt\nOutput {0}/demo.cast\nType \"hi\"\nSleep 100ms\n",
            dir.path().display()
        );
        let recording = record(&script).await;
        let encoder = FakeEncoder::default();
        let written = assemble(&recording, &encoder).unwrap();

        assert_eq!(written.len(), 2);
        assert!(encoder.calls.borrow().is_empty());
        let text = fs::read_to_string(dir.path().join("golden.txt")).unwrap();
        assert!(text.contains("> hi\n"));
        assert!(text.contains(&"─".repeat(RULE_WIDTH)));
        let cast = fs::read_to_string(dir.path().join("demo.cast")).unwrap();
        assert!(cast.starts_with("{\"version\":2"));
    }

    #[tokio::test]
    async fn test_cast_keeps_trailing_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "Output {}/demo.cast\nType \"hi\"\nSleep 5s\n",
            dir.path().display()
        );
        let recording = record(&script).await;
        let end = recording.frames.ticks().last().unwrap().timestamp;
        assert!(end >= Duration::from_secs(5));
        assemble(&recording, &FakeEncoder::default()).unwrap();

        let cast = fs::read_to_string(dir.path().join("demo.cast")).unwrap();
        let last: serde_json::Value = serde_json::from_str(cast.lines().last().unwrap()).unwrap();
        assert!((last[0].as_f64().unwrap() - end.as_secs_f64()).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_same_named_targets_get_separate_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "Output {0}/a/demo.gif\nOutput {0}/b/demo.gif\nType \"x\"\n",
            dir.path().display()
        );
        let recording = record(&script).await;
        let encoder = FakeEncoder::default();
        assemble(&recording, &encoder).unwrap();
        assert_eq!(encoder.casts.borrow().len(), 2);
        assert_ne!(encoder.casts.borrow()[0], encoder.casts.borrow()[1]);
    }

    #[test]
    fn test_scratch_paths_are_indexed() {
        let dir = Path::new("/tmp/work");
        let target = Path::new("out/demo.mp4");
        assert_eq!(
            Scratch::new(dir, 0).path(target, "gif"),
            dir.join("0-demo.gif")
        );
        assert_ne!(
            Scratch::new(dir, 0).path(target, "cast"),
            Scratch::new(dir, 1).path(target, "cast")
        );
    }

    #[tokio::test]
    async fn test_video_goes_through_gif() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "Output {0}/nested/demo.mp4\nType \"x\"\n",
            dir.path().display()
        );
        let recording = record(&script).await;
        let encoder = FakeEncoder::default();
        let written = assemble(&recording, &encoder).unwrap();

        assert_eq!(written, vec![dir.path().join("nested/demo.mp4")]);
        let calls = encoder.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("gif "));
        assert!(calls[1].starts_with("Mp4 "));
    }

    #[tokio::test]
    async fn test_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "Type \"ls\"\nScreenshot {0}/shot.txt\nScreenshot {0}/shot.png\n",
            dir.path().display()
        );
        let recording = record(&script).await;
        let encoder = FakeEncoder::default();
        let written = assemble(&recording, &encoder).unwrap();

        assert_eq!(written.len(), 2);
        let text = fs::read_to_string(dir.path().join("shot.txt")).unwrap();
        assert!(text.starts_with("> ls\n"));
        assert!(encoder.calls.borrow().iter().any(|c| c.starts_with("Png ")));
    }

    #[tokio::test]
    async fn test_empty_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("Output {}/demo.gif\nType \"x\"\n", dir.path().display());
        let recording = record(&script).await;
        let encoder = FakeEncoder {
            empty: true,
            ..FakeEncoder::default()
        };
        assert!(matches!(
            assemble(&recording, &encoder),
            Err(EncodeError::EmptyArtifact { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_frames() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("Output {}/demo.gif\n", dir.path().display());
        let recording = record(&script).await;
        assert!(matches!(
            assemble(&recording, &FakeEncoder::default()),
            Err(EncodeError::NoFrames { .. })
        ));
    }

    #[test]
    fn test_missing_encoder_program() {
        let encoder = ExternalEncoder {
            agg: PathBuf::from("tapereel-no-such-agg"),
            ..ExternalEncoder::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let cast = dir.path().join("in.cast");
        fs::write(&cast, "{}").unwrap();
        let err = encoder
            .render_gif(&cast, &dir.path().join("out.gif"), &Settings::default())
            .unwrap_err();
        assert!(matches!(err, EncodeError::MissingEncoder { .. }));
    }

    #[tokio::test]
    async fn test_record_tape_emits_partial_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputTarget::recording(dir.path().join("partial.txt")).unwrap();
        let tape = parse_str("Type \"ls\"\nSet Framerate 0\n").unwrap();
        let mut engine = engine(AbortPolicy::EmitPartial);

        let err = record_tape(&mut engine, &tape, &FakeEncoder::default(), &[out])
            .await
            .unwrap_err();
        assert_eq!(err.command_index(), Some(1));
        let text = fs::read_to_string(dir.path().join("partial.txt")).unwrap();
        assert!(text.contains("> ls"));
    }

    #[tokio::test]
    async fn test_record_tape_discards_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputTarget::recording(dir.path().join("discarded.txt")).unwrap();
        let tape = parse_str("Type \"ls\"\nRequire tapereel-no-such-program\n").unwrap();
        let mut engine = engine(AbortPolicy::Discard);

        assert!(
            record_tape(&mut engine, &tape, &FakeEncoder::default(), &[out])
                .await
                .is_err()
        );
        assert!(!dir.path().join("discarded.txt").exists());
    }
}
