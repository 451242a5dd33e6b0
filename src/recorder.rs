//! Frame capture and the append-only frame buffer.
//!
//! The recorder keeps its own timeline: it only moves forward while recording
//! is active, so a `Hide`/`Show` stretch leaves no gap in the output. Ticks
//! fall on whole multiples of the frame interval on that timeline. The engine
//! asks for them between writes, never in the middle of one.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::terminal::{Screen, Terminal};

/// Why a frame was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOrigin {
    Tick,
    Screenshot(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position on the recording timeline.
    pub timestamp: Duration,
    pub origin: FrameOrigin,
    pub screen: Screen,
}

/// Frames in capture order. Only the [`Recorder`] appends.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<Frame>,
}

impl FrameSequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// Frames taken by the capture ticker, i.e. the animation.
    pub fn ticks(&self) -> impl Iterator<Item = &Frame> {
        self.frames
            .iter()
            .filter(|frame| frame.origin == FrameOrigin::Tick)
    }

    /// Screenshot frames with their destination path.
    pub fn screenshots(&self) -> impl Iterator<Item = (&PathBuf, &Frame)> {
        self.frames.iter().filter_map(|frame| match &frame.origin {
            FrameOrigin::Screenshot(path) => Some((path, frame)),
            FrameOrigin::Tick => None,
        })
    }
}

impl<'a> IntoIterator for &'a FrameSequence {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[derive(Debug)]
pub struct Recorder {
    frames: FrameSequence,
    recording: bool,
    position: Duration,
    next_tick: Duration,
    interval: Duration,
}

impl Recorder {
    pub fn new(interval: Duration) -> Self {
        Self {
            frames: FrameSequence::default(),
            recording: true,
            position: Duration::ZERO,
            next_tick: Duration::ZERO,
            interval,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// Takes effect from the tick after the next one.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn frames(&self) -> &FrameSequence {
        &self.frames
    }

    /// Time left on the recording timeline before the next tick is due.
    pub fn until_next_tick(&self) -> Duration {
        self.next_tick.saturating_sub(self.position)
    }

    /// Move the recording timeline forward. Ignored while hidden.
    pub fn elapse(&mut self, duration: Duration) {
        if self.recording {
            self.position += duration;
        }
    }

    /// Snapshot `terminal` as it stands right now.
    pub fn capture(
        terminal: &mut dyn Terminal,
        timestamp: Duration,
        origin: FrameOrigin,
    ) -> Result<Frame> {
        Ok(Frame {
            timestamp,
            origin,
            screen: terminal.snapshot()?,
        })
    }

    /// Append a captured frame. Timestamps never go backwards.
    pub fn append(&mut self, mut frame: Frame) {
        if let Some(last) = self.frames.frames.last() {
            frame.timestamp = frame.timestamp.max(last.timestamp);
        }
        self.frames.frames.push(frame);
    }

    /// Capture the due tick and schedule the next one.
    pub fn tick(&mut self, terminal: &mut dyn Terminal) -> Result<()> {
        let frame = Self::capture(terminal, self.next_tick, FrameOrigin::Tick)?;
        self.append(frame);
        self.next_tick += self.interval;
        Ok(())
    }

    /// Capture out of cadence (screenshots, the closing frame) at the current
    /// position.
    pub fn capture_now(&mut self, terminal: &mut dyn Terminal, origin: FrameOrigin) -> Result<()> {
        let frame = Self::capture(terminal, self.position, origin)?;
        self.append(frame);
        Ok(())
    }

    pub fn into_frames(self) -> FrameSequence {
        self.frames
    }
}
