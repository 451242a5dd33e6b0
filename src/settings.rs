//! Session-wide settings mutated by `Set`, `Output` and `Env`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::CommandError;
use crate::parser::parse_duration;
use crate::theme::{self, Theme};

/// Shells a tape may select with `Set Shell`.
pub const SHELLS: &[&str] = &["bash", "zsh", "fish", "sh", "nu", "xonsh", "pwsh"];

// Rough advance width of a monospace glyph relative to its point size.
const GLYPH_ASPECT: f64 = 0.6;

pub const MIN_PLAYBACK_SPEED: f64 = 0.01;
pub const MAX_PLAYBACK_SPEED: f64 = 100.0;

macro_rules! setting_names {
    ($($variant:ident),+ $(,)?) => {
        /// Every name accepted after `Set`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum SettingName {
            $($variant),+
        }

        impl SettingName {
            pub const ALL: &'static [SettingName] = &[$(SettingName::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(SettingName::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

setting_names!(
    Shell,
    FontFamily,
    FontSize,
    LineHeight,
    Width,
    Height,
    Padding,
    Framerate,
    PlaybackSpeed,
    TypingSpeed,
    Theme,
    WaitTimeout,
    WaitPattern,
);

impl SettingName {
    /// Settings that change the terminal's rows or columns.
    pub fn affects_geometry(self) -> bool {
        matches!(
            self,
            Self::FontSize | Self::LineHeight | Self::Width | Self::Height | Self::Padding
        )
    }
}

impl FromStr for SettingName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|setting| setting.name() == s)
            .ok_or(())
    }
}

impl fmt::Display for SettingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Artifact kinds, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Gif,
    Mp4,
    Webm,
    Cast,
    Text,
    Png,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gif" => Some(Self::Gif),
            "mp4" => Some(Self::Mp4),
            "webm" => Some(Self::Webm),
            "cast" => Some(Self::Cast),
            "txt" | "ascii" => Some(Self::Text),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Whether an `Output` directive may target this format.
    pub fn is_recording(self) -> bool {
        !matches!(self, Self::Png)
    }

    /// Whether a `Screenshot` may target this format.
    pub fn is_still(self) -> bool {
        matches!(self, Self::Png | Self::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub format: OutputFormat,
}

impl OutputTarget {
    /// Parse an `Output` path. Fails on extensions that are not recordings.
    pub fn recording(path: impl Into<PathBuf>) -> Result<Self, CommandError> {
        let path = path.into();
        match OutputFormat::from_path(&path) {
            Some(format) if format.is_recording() => Ok(Self { path, format }),
            _ => Err(CommandError::argument(format!(
                "unsupported output {}: expected .gif, .mp4, .webm, .cast, .txt or .ascii",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub shell: String,
    pub font_family: String,
    pub font_size: u16,
    pub line_height: f64,
    /// Canvas width in pixels.
    pub width: u16,
    /// Canvas height in pixels.
    pub height: u16,
    pub padding: u16,
    pub framerate: u16,
    pub playback_speed: f64,
    pub typing_speed: Duration,
    pub theme: Theme,
    pub wait_timeout: Duration,
    pub wait_pattern: String,
    pub outputs: Vec<OutputTarget>,
    /// `Env` overrides, applied to the shell and to interpolation.
    pub env: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            font_family: "JetBrains Mono,DejaVu Sans Mono,Menlo,Hack,monospace".to_string(),
            font_size: 22,
            line_height: 1.0,
            width: 1200,
            height: 600,
            padding: 60,
            framerate: 50,
            playback_speed: 1.0,
            typing_speed: Duration::from_millis(50),
            theme: Theme::default(),
            wait_timeout: Duration::from_secs(15),
            wait_pattern: ">$".to_string(),
            outputs: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Validate `value` and store it.
    ///
    /// A bad theme still resets the theme to the default before the error is
    /// returned.
    pub fn apply(&mut self, setting: SettingName, value: &str) -> Result<(), CommandError> {
        let value = value.trim();
        match setting {
            SettingName::Shell => {
                if !SHELLS.contains(&value) {
                    return Err(invalid(
                        setting,
                        value,
                        &format!("expected one of {}", SHELLS.join(", ")),
                    ));
                }
                self.shell = value.to_string();
            }
            SettingName::FontFamily => {
                if value.is_empty() {
                    return Err(invalid(setting, value, "font family cannot be empty"));
                }
                self.font_family = value.to_string();
            }
            SettingName::FontSize => self.font_size = parse_bounded(setting, value, 1, 512)?,
            SettingName::LineHeight => {
                self.line_height = parse_positive(setting, value)?;
            }
            SettingName::Width => self.width = parse_bounded(setting, value, 1, u16::MAX)?,
            SettingName::Height => self.height = parse_bounded(setting, value, 1, u16::MAX)?,
            SettingName::Padding => self.padding = parse_bounded(setting, value, 0, u16::MAX)?,
            SettingName::Framerate => self.framerate = parse_bounded(setting, value, 1, 120)?,
            SettingName::PlaybackSpeed => {
                let speed = parse_positive(setting, value)?;
                if !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&speed) {
                    return Err(invalid(
                        setting,
                        value,
                        &format!("must be between {MIN_PLAYBACK_SPEED} and {MAX_PLAYBACK_SPEED}"),
                    ));
                }
                self.playback_speed = speed;
            }
            SettingName::TypingSpeed => self.typing_speed = parse_time(setting, value)?,
            SettingName::WaitTimeout => self.wait_timeout = parse_time(setting, value)?,
            SettingName::WaitPattern => {
                regex::Regex::new(value).map_err(|err| invalid(setting, value, &err.to_string()))?;
                self.wait_pattern = value.to_string();
            }
            SettingName::Theme => {
                let (theme, err) = theme::resolve_or_default(value);
                self.theme = theme;
                if let Some(err) = err {
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Terminal `(rows, cols)` that fit the canvas after padding.
    pub fn terminal_size(&self) -> (u16, u16) {
        let inner_w = f64::from(self.width.saturating_sub(self.padding.saturating_mul(2)));
        let inner_h = f64::from(self.height.saturating_sub(self.padding.saturating_mul(2)));
        let cell_w = f64::from(self.font_size) * GLYPH_ASPECT;
        let cell_h = f64::from(self.font_size) * self.line_height;
        let cols = (inner_w / cell_w).floor().clamp(1.0, f64::from(u16::MAX)) as u16;
        let rows = (inner_h / cell_h).floor().clamp(1.0, f64::from(u16::MAX)) as u16;
        (rows, cols)
    }

    /// Spacing between capture ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.framerate.max(1)))
    }

    pub fn add_output(&mut self, target: OutputTarget) {
        if !self.outputs.contains(&target) {
            self.outputs.push(target);
        }
    }
}

fn invalid(setting: SettingName, value: &str, reason: &str) -> CommandError {
    CommandError::argument(format!("invalid `Set {setting} {value}`: {reason}"))
}

fn parse_bounded(setting: SettingName, value: &str, min: u16, max: u16) -> Result<u16, CommandError> {
    let parsed: u16 = value
        .parse()
        .map_err(|_| invalid(setting, value, "expected a whole number"))?;
    if !(min..=max).contains(&parsed) {
        return Err(invalid(
            setting,
            value,
            &format!("must be between {min} and {max}"),
        ));
    }
    Ok(parsed)
}

fn parse_positive(setting: SettingName, value: &str) -> Result<f64, CommandError> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed > 0.0 => Ok(parsed),
        _ => Err(invalid(setting, value, "expected a positive number")),
    }
}

fn parse_time(setting: SettingName, value: &str) -> Result<Duration, CommandError> {
    parse_duration(value).map_err(|err| invalid(setting, value, &err.to_string()))
}
