//! asciicast v2 output: a JSON header line followed by one JSON array per
//! event.

use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;

use crate::recorder::Frame;
use crate::theme::Theme;

// Clear and home before each redraw so every event stands alone.
const REDRAW: &[u8] = b"\x1b[H\x1b[2J";

#[derive(Debug, Serialize)]
pub struct Header {
    pub version: u8,
    pub width: u16,
    pub height: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub env: HeaderEnv,
    pub theme: HeaderTheme,
}

#[derive(Debug, Serialize)]
pub struct HeaderEnv {
    #[serde(rename = "TERM")]
    pub term: String,
    #[serde(rename = "SHELL")]
    pub shell: String,
}

#[derive(Debug, Serialize)]
pub struct HeaderTheme {
    pub fg: String,
    pub bg: String,
    /// Colon-separated list of the 16 palette colours.
    pub palette: String,
}

impl HeaderTheme {
    pub fn from_theme(theme: &Theme) -> Self {
        Self {
            fg: theme.foreground.clone(),
            bg: theme.background.clone(),
            palette: theme.palette().join(":"),
        }
    }
}

pub struct Writer<W: Write> {
    inner: W,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn header(&mut self, header: &Header) -> io::Result<()> {
        serde_json::to_writer(&mut self.inner, header)?;
        self.inner.write_all(b"\n")
    }

    pub fn output(&mut self, time: Duration, data: &[u8]) -> io::Result<()> {
        self.event(time, "o", &String::from_utf8_lossy(data))
    }

    pub fn resize(&mut self, time: Duration, (cols, rows): (u16, u16)) -> io::Result<()> {
        self.event(time, "r", &format!("{cols}x{rows}"))
    }

    fn event(&mut self, time: Duration, code: &str, data: &str) -> io::Result<()> {
        serde_json::to_writer(&mut self.inner, &(time.as_secs_f64(), code, data))?;
        self.inner.write_all(b"\n")
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Write `frames` as a cast. Timestamps are divided by `speed`, and a frame
/// whose screen matches the previous one is skipped.
///
/// The cast always ends at the last frame's timestamp: if that frame was
/// skipped, an empty output event marks the end of the recording.
pub fn write_frames<'a, W, I>(
    writer: &mut Writer<W>,
    mut header: Header,
    frames: I,
    speed: f64,
) -> io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Frame>,
{
    let mut frames = frames.into_iter().peekable();
    if let Some(first) = frames.peek() {
        header.width = first.screen.cols;
        header.height = first.screen.rows;
    }
    writer.header(&header)?;

    let mut size = (header.width, header.height);
    let mut previous: Option<&Frame> = None;
    let mut last: Option<&Frame> = None;
    let mut events = 0;
    for frame in frames {
        last = Some(frame);
        if previous.is_some_and(|prev| prev.screen == frame.screen) {
            continue;
        }
        let time = scale(frame.timestamp, speed);
        let frame_size = (frame.screen.cols, frame.screen.rows);
        if frame_size != size {
            writer.resize(time, frame_size)?;
            size = frame_size;
        }
        let mut data = REDRAW.to_vec();
        data.extend_from_slice(&frame.screen.formatted);
        writer.output(time, &data)?;
        events += 1;
        previous = Some(frame);
    }
    if let (Some(last), Some(emitted)) = (last, previous) {
        if last.timestamp > emitted.timestamp {
            writer.output(scale(last.timestamp, speed), b"")?;
            events += 1;
        }
    }
    Ok(events)
}

/// Divide `timestamp` by `speed`, saturating at [`Duration::MAX`]. A speed
/// that is not a positive finite number leaves the timestamp as it is.
fn scale(timestamp: Duration, speed: f64) -> Duration {
    if speed > 0.0 && speed.is_finite() {
        Duration::try_from_secs_f64(timestamp.as_secs_f64() / speed).unwrap_or(Duration::MAX)
    } else {
        timestamp
    }
}
