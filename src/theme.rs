//! Colour themes: the built-in catalog, inline JSON overrides and the
//! resolver behind `Set Theme`.
//!
//! Resolution never exposes a partially merged theme. Every failure path
//! hands back the [`Theme::default`] record together with a [`ThemeError`]
//! whose text is shown to the user as-is.
//!
//! The catalog is `themes.json`, compiled into the binary and parsed on first
//! use.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// A fully populated colour theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub name: String,
    pub background: String,
    pub foreground: String,
    pub selection: String,
    pub cursor: String,
    pub cursor_accent: String,
    pub black: String,
    pub red: String,
    pub green: String,
    pub yellow: String,
    pub blue: String,
    pub magenta: String,
    pub cyan: String,
    pub white: String,
    pub bright_black: String,
    pub bright_red: String,
    pub bright_green: String,
    pub bright_yellow: String,
    pub bright_blue: String,
    pub bright_magenta: String,
    pub bright_cyan: String,
    pub bright_white: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: String::new(),
            background: "#171717".to_string(),
            foreground: "#dddddd".to_string(),
            selection: "#3a3a3a".to_string(),
            cursor: "#dddddd".to_string(),
            cursor_accent: "#171717".to_string(),
            black: "#282a2e".to_string(),
            red: "#d74e6f".to_string(),
            green: "#31bb71".to_string(),
            yellow: "#d3e561".to_string(),
            blue: "#8056ff".to_string(),
            magenta: "#ed61d7".to_string(),
            cyan: "#04d7d7".to_string(),
            white: "#bfbfbf".to_string(),
            bright_black: "#4d4d4d".to_string(),
            bright_red: "#fe5f86".to_string(),
            bright_green: "#00d787".to_string(),
            bright_yellow: "#ebff71".to_string(),
            bright_blue: "#9b79ff".to_string(),
            bright_magenta: "#ff7aea".to_string(),
            bright_cyan: "#00fefe".to_string(),
            bright_white: "#e6e6e6".to_string(),
        }
    }
}

impl Theme {
    /// The 16 ANSI palette entries, normal colours first.
    pub fn palette(&self) -> [&str; 16] {
        [
            &self.black,
            &self.red,
            &self.green,
            &self.yellow,
            &self.blue,
            &self.magenta,
            &self.cyan,
            &self.white,
            &self.bright_black,
            &self.bright_red,
            &self.bright_green,
            &self.bright_yellow,
            &self.bright_blue,
            &self.bright_magenta,
            &self.bright_cyan,
            &self.bright_white,
        ]
    }

    /// Theme in the `bg,fg,c0,...,c15` form accepted by `agg --theme`.
    pub fn agg_spec(&self) -> String {
        let mut colours = vec![hex6(&self.background), hex6(&self.foreground)];
        colours.extend(self.palette().iter().map(|c| hex6(c)));
        colours.join(",")
    }

    fn from_palette(p: &Palette) -> Self {
        let [
            black,
            red,
            green,
            yellow,
            blue,
            magenta,
            cyan,
            white,
            bright_black,
            bright_red,
            bright_green,
            bright_yellow,
            bright_blue,
            bright_magenta,
            bright_cyan,
            bright_white,
        ] = &p.colors;
        Self {
            name: p.name.to_string(),
            background: p.background.to_string(),
            foreground: p.foreground.to_string(),
            selection: p.selection.to_string(),
            cursor: p.cursor.to_string(),
            cursor_accent: p.background.to_string(),
            black: black.to_string(),
            red: red.to_string(),
            green: green.to_string(),
            yellow: yellow.to_string(),
            blue: blue.to_string(),
            magenta: magenta.to_string(),
            cyan: cyan.to_string(),
            white: white.to_string(),
            bright_black: bright_black.to_string(),
            bright_red: bright_red.to_string(),
            bright_green: bright_green.to_string(),
            bright_yellow: bright_yellow.to_string(),
            bright_blue: bright_blue.to_string(),
            bright_magenta: bright_magenta.to_string(),
            bright_cyan: bright_cyan.to_string(),
            bright_white: bright_white.to_string(),
        }
    }
}

/// Inline JSON override. Only present keys replace the default theme.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemePatch {
    pub name: Option<String>,
    pub background: Option<String>,
    pub foreground: Option<String>,
    pub selection: Option<String>,
    pub cursor: Option<String>,
    pub cursor_accent: Option<String>,
    pub black: Option<String>,
    pub red: Option<String>,
    pub green: Option<String>,
    pub yellow: Option<String>,
    pub blue: Option<String>,
    pub magenta: Option<String>,
    pub cyan: Option<String>,
    pub white: Option<String>,
    pub bright_black: Option<String>,
    pub bright_red: Option<String>,
    pub bright_green: Option<String>,
    pub bright_yellow: Option<String>,
    pub bright_blue: Option<String>,
    pub bright_magenta: Option<String>,
    pub bright_cyan: Option<String>,
    pub bright_white: Option<String>,
}

macro_rules! merge_colours {
    ($patch:expr, $theme:expr, $($field:ident => $key:literal),+ $(,)?) => {
        $(
            if let Some(value) = $patch.$field {
                if !is_hex_colour(&value) {
                    return Err(ThemeError::InvalidColour { key: $key, value });
                }
                $theme.$field = value;
            }
        )+
    };
}

impl ThemePatch {
    /// Merge onto `base` field by field. Any invalid colour rejects the whole
    /// patch.
    pub fn apply(self, base: Theme) -> Result<Theme, ThemeError> {
        let mut theme = base;
        if let Some(name) = self.name {
            theme.name = name;
        }
        merge_colours!(self, theme,
            background => "background",
            foreground => "foreground",
            selection => "selection",
            cursor => "cursor",
            cursor_accent => "cursorAccent",
            black => "black",
            red => "red",
            green => "green",
            yellow => "yellow",
            blue => "blue",
            magenta => "magenta",
            cyan => "cyan",
            white => "white",
            bright_black => "brightBlack",
            bright_red => "brightRed",
            bright_green => "brightGreen",
            bright_yellow => "brightYellow",
            bright_blue => "brightBlue",
            bright_magenta => "brightMagenta",
            bright_cyan => "brightCyan",
            bright_white => "brightWhite",
        );
        Ok(theme)
    }
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("invalid `Set Theme {input}`: {source}")]
    InvalidJson {
        input: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid `Set Theme` colour {key}: {value:?} is not a #RRGGBB hex colour")]
    InvalidColour { key: &'static str, value: String },

    #[error("invalid `Set Theme \"{input}\"`: did you mean \"{suggestion}\"")]
    Suggestion { input: String, suggestion: String },

    #[error("invalid `Set Theme \"{input}\"`: unknown theme")]
    Unknown { input: String },
}

/// Resolve a `Set Theme` argument: blank, inline JSON or a catalog name.
pub fn resolve(spec: &str) -> Result<Theme, ThemeError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(Theme::default());
    }

    if spec.starts_with('{') {
        let patch: ThemePatch =
            serde_json::from_str(spec).map_err(|source| ThemeError::InvalidJson {
                input: spec.to_string(),
                source,
            })?;
        return patch.apply(Theme::default());
    }

    if let Some(theme) = find(spec) {
        return Ok(theme);
    }

    match suggest(spec) {
        Some(suggestion) => Err(ThemeError::Suggestion {
            input: spec.to_string(),
            suggestion: suggestion.to_string(),
        }),
        None => Err(ThemeError::Unknown {
            input: spec.to_string(),
        }),
    }
}

/// Like [`resolve`] but always yields a usable theme: the default one on
/// failure, alongside the error.
pub fn resolve_or_default(spec: &str) -> (Theme, Option<ThemeError>) {
    match resolve(spec) {
        Ok(theme) => (theme, None),
        Err(err) => (Theme::default(), Some(err)),
    }
}

/// Exact name lookup, then case-insensitive.
pub fn find(name: &str) -> Option<Theme> {
    CATALOG
        .iter()
        .find(|p| p.name == name)
        .or_else(|| CATALOG.iter().find(|p| p.name.eq_ignore_ascii_case(name)))
        .map(Theme::from_palette)
}

/// Names of every built-in theme, in catalog order.
pub fn catalog() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|p| p.name.as_str())
}

/// Closest catalog name within `max(2, len / 4)` edits, ignoring case.
pub fn suggest(input: &str) -> Option<&'static str> {
    let needle = input.to_lowercase();
    let threshold = (needle.chars().count() / 4).max(2);
    CATALOG
        .iter()
        .map(|p| (p.name.as_str(), levenshtein(&needle, &p.name.to_lowercase())))
        .filter(|(_, distance)| *distance <= threshold)
        .min_by_key(|(_, distance)| *distance)
        .map(|(name, _)| name)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn is_hex_colour(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

// `#abc` -> `aabbcc`, `#a1b2c3` -> `a1b2c3`
fn hex6(colour: &str) -> String {
    let hex = colour.trim_start_matches('#');
    if hex.len() == 3 {
        hex.chars().flat_map(|c| [c, c]).collect()
    } else {
        hex.to_string()
    }
}

/// One entry of `themes.json`.
#[derive(Debug, Deserialize)]
struct Palette {
    name: String,
    background: String,
    foreground: String,
    selection: String,
    cursor: String,
    colors: [String; 16],
}

static CATALOG: LazyLock<Vec<Palette>> = LazyLock::new(|| {
    serde_json::from_str(include_str!("themes.json")).unwrap_or_else(|err| {
        warn!(error = %err, "built-in theme table is unreadable");
        Vec::new()
    })
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_spec_is_default() {
        for spec in ["", "  ", "\t\n"] {
            assert_eq!(resolve(spec).unwrap(), Theme::default());
        }
    }

    #[test]
    fn test_named_theme() {
        let theme = resolve("Andromeda").unwrap();
        assert_ne!(theme, Theme::default());
        assert_eq!(theme.name, "Andromeda");
        assert_eq!(theme.background, "#262a33");
    }

    #[test]
    fn test_named_theme_ignores_case() {
        assert_eq!(resolve("catppuccin mocha").unwrap().name, "Catppuccin Mocha");
    }

    #[test]
    fn test_json_overrides_only_present_keys() {
        let theme = resolve(r##"{"background": "#29283b"}"##).unwrap();
        assert_ne!(theme, Theme::default());
        assert_eq!(theme.background, "#29283b");

        let default = Theme::default();
        assert_eq!(theme.foreground, default.foreground);
        assert_eq!(theme.palette(), default.palette());
    }

    #[test]
    fn test_json_with_camel_case_keys() {
        let theme = resolve(r##"{"brightBlack": "#111", "cursorAccent": "#222222"}"##).unwrap();
        assert_eq!(theme.bright_black, "#111");
        assert_eq!(theme.cursor_accent, "#222222");
    }

    #[test]
    fn test_suggestion() {
        let (theme, err) = resolve_or_default("cattppuccin latt");
        assert_eq!(
            err.unwrap().to_string(),
            "invalid `Set Theme \"cattppuccin latt\"`: did you mean \"Catppuccin Latte\""
        );
        assert_eq!(theme, Theme::default());
    }

    #[test]
    fn test_one_character_typo_is_suggested() {
        assert_eq!(suggest("Dracla"), Some("Dracula"));
        assert_eq!(suggest("Nordd"), Some("Nord"));
    }

    #[test]
    fn test_invalid_json() {
        let (theme, err) = resolve_or_default(r#"{"background"#);
        assert!(matches!(err, Some(ThemeError::InvalidJson { .. })));
        assert_eq!(theme, Theme::default());
    }

    #[test]
    fn test_invalid_colour_rejects_patch() {
        let (theme, err) = resolve_or_default(r#"{"background": "navy"}"#);
        assert!(matches!(
            err,
            Some(ThemeError::InvalidColour { key: "background", .. })
        ));
        assert_eq!(theme, Theme::default());
    }

    #[test]
    fn test_unknown_theme_has_no_suggestion() {
        let (theme, err) = resolve_or_default("foobar");
        let err = err.unwrap();
        assert!(matches!(err, ThemeError::Unknown { .. }));
        assert!(!err.to_string().contains("did you mean"));
        assert_eq!(theme, Theme::default());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("nord", "nord"), 0);
    }

    #[test]
    fn test_agg_spec_expands_short_colours() {
        let theme = ThemePatch {
            background: Some("#abc".to_string()),
            ..ThemePatch::default()
        }
        .apply(Theme::default())
        .unwrap();
        let spec = theme.agg_spec();
        assert!(spec.starts_with("aabbcc,dddddd,"));
        assert_eq!(spec.split(',').count(), 18);
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let mut names: Vec<_> = catalog().collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_bundled_table_loads_with_valid_colours() {
        assert!(catalog().count() >= 30);
        for palette in CATALOG.iter() {
            let theme = Theme::from_palette(palette);
            assert!(is_hex_colour(&theme.background), "{}", theme.name);
            assert!(is_hex_colour(&theme.foreground), "{}", theme.name);
            assert!(is_hex_colour(&theme.selection), "{}", theme.name);
            assert!(is_hex_colour(&theme.cursor), "{}", theme.name);
            assert!(
                theme.palette().iter().all(|c| is_hex_colour(c)),
                "{}",
                theme.name
            );
        }
    }

    #[test]
    fn test_variants_resolve_by_full_name() {
        assert_eq!(resolve("Tokyo Night Storm").unwrap().background, "#24283b");
        assert_eq!(resolve("rose pine dawn").unwrap().name, "Rose Pine Dawn");
        assert_eq!(suggest("Kanagwa"), Some("Kanagawa"));
    }
}
