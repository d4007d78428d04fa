//! Configuration and color scheme management for procterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.procterm/config.toml`
//! - Built-in color schemes for the console styles
//!
//! # Configuration File
//!
//! ```toml
//! # Program started when none is given on the command line
//! program = "python3"
//! arguments = "-i"
//!
//! # Announce process start and exit
//! show_diagnostics = true
//!
//! # Echo submitted lines into the scrollback
//! echo_input = true
//!
//! # Color scheme: default, solarized-dark, monokai, nord
//! color_scheme = "nord"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::session::OutputStyle;
use crate::history::HISTORY_LIMIT;

/// Default number of scrollback lines kept by the renderer
pub const SCROLLBACK_LIMIT: usize = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default program to run
    pub program: Option<String>,
    /// Default arguments for `program`
    pub arguments: String,
    /// Announce process start and exit
    pub show_diagnostics: bool,
    /// Whether the input line accepts typing
    pub input_enabled: bool,
    /// Echo submitted lines into the scrollback
    pub echo_input: bool,
    /// Maximum history entries, 0 for unlimited
    pub history_limit: usize,
    /// Maximum scrollback lines
    pub scrollback_limit: usize,
    /// Color scheme name
    pub color_scheme: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: None,
            arguments: String::new(),
            show_diagnostics: false,
            input_enabled: true,
            echo_input: true,
            history_limit: HISTORY_LIMIT,
            scrollback_limit: SCROLLBACK_LIMIT,
            color_scheme: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::get_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the color scheme
    pub fn get_color_scheme(&self) -> ColorScheme {
        ColorScheme::by_name(&self.color_scheme)
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Color scheme definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub name: String,

    // Scrollback text
    pub normal_fg: Color,
    pub error_fg: Color,
    pub diagnostic_fg: Color,

    // Input line
    pub prompt_fg: Color,
    pub input_fg: Color,
    pub input_disabled_fg: Color,

    // Status bar
    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    pub status_exited_bg: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_scheme()
    }
}

impl ColorScheme {
    /// Default color scheme
    pub fn default_scheme() -> Self {
        Self {
            name: "default".to_string(),

            normal_fg: Color::new(255, 255, 255),
            error_fg: Color::new(255, 0, 0),
            diagnostic_fg: Color::new(0, 255, 0),

            prompt_fg: Color::new(100, 150, 255),
            input_fg: Color::new(255, 255, 255),
            input_disabled_fg: Color::new(110, 110, 110),

            status_bar_bg: Color::new(0, 100, 0),
            status_bar_fg: Color::new(255, 255, 255),
            status_exited_bg: Color::new(120, 40, 40),
        }
    }

    /// Solarized Dark scheme
    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark".to_string(),

            normal_fg: Color::new(147, 161, 161),
            error_fg: Color::new(220, 50, 47),
            diagnostic_fg: Color::new(133, 153, 0),

            prompt_fg: Color::new(38, 139, 210),
            input_fg: Color::new(253, 246, 227),
            input_disabled_fg: Color::new(88, 110, 117),

            status_bar_bg: Color::new(7, 54, 66),
            status_bar_fg: Color::new(147, 161, 161),
            status_exited_bg: Color::new(203, 75, 22),
        }
    }

    /// Monokai scheme
    pub fn monokai() -> Self {
        Self {
            name: "monokai".to_string(),

            normal_fg: Color::new(248, 248, 242),
            error_fg: Color::new(249, 38, 114),
            diagnostic_fg: Color::new(166, 226, 46),

            prompt_fg: Color::new(102, 217, 239),
            input_fg: Color::new(248, 248, 242),
            input_disabled_fg: Color::new(117, 113, 94),

            status_bar_bg: Color::new(62, 61, 50),
            status_bar_fg: Color::new(248, 248, 242),
            status_exited_bg: Color::new(249, 38, 114),
        }
    }

    /// Nord scheme
    pub fn nord() -> Self {
        Self {
            name: "nord".to_string(),

            normal_fg: Color::new(216, 222, 233),
            error_fg: Color::new(191, 97, 106),
            diagnostic_fg: Color::new(163, 190, 140),

            prompt_fg: Color::new(136, 192, 208),
            input_fg: Color::new(236, 239, 244),
            input_disabled_fg: Color::new(76, 86, 106),

            status_bar_bg: Color::new(59, 66, 82),
            status_bar_fg: Color::new(216, 222, 233),
            status_exited_bg: Color::new(191, 97, 106),
        }
    }

    /// Get scheme by name
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "solarized-dark" | "solarized_dark" => Self::solarized_dark(),
            "monokai" => Self::monokai(),
            "nord" => Self::nord(),
            _ => Self::default_scheme(),
        }
    }

    /// List available schemes
    pub fn list() -> Vec<&'static str> {
        vec!["default", "solarized-dark", "monokai", "nord"]
    }

    /// Foreground color for a console style
    pub fn style_fg(&self, style: OutputStyle) -> Color {
        match style {
            OutputStyle::Normal => self.normal_fg,
            OutputStyle::Error => self.error_fg,
            OutputStyle::Diagnostic => self.diagnostic_fg,
        }
    }
}

/// `~/.procterm`, created on first use
pub fn config_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".procterm");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("show_diagnostics = true\ncolor_scheme = \"nord\"\n").unwrap();
        assert!(config.show_diagnostics);
        assert!(config.input_enabled);
        assert!(config.echo_input);
        assert_eq!(config.history_limit, HISTORY_LIMIT);
        assert_eq!(config.get_color_scheme().name, "nord");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(Config::parse("show_diagnostics = \"yes\"").is_err());

        let path = std::env::temp_dir().join(format!("procterm-bad-{}.toml", std::process::id()));
        fs::write(&path, "history_limit = [").unwrap();
        let result = Config::load_from(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let result = Config::load_from(Path::new("/nonexistent/procterm/config.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config {
            program: Some("python3".into()),
            arguments: "-i".into(),
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), config);
    }

    #[test]
    fn test_unknown_scheme_falls_back() {
        assert_eq!(ColorScheme::by_name("SOLARIZED_DARK").name, "solarized-dark");
        assert_eq!(ColorScheme::by_name("no-such-theme").name, "default");
        for name in ColorScheme::list() {
            assert_eq!(ColorScheme::by_name(name).name, name);
        }
    }

    #[test]
    fn test_style_colors_are_distinct() {
        let scheme = ColorScheme::default_scheme();
        assert_ne!(scheme.style_fg(OutputStyle::Normal), scheme.style_fg(OutputStyle::Error));
        assert_ne!(scheme.style_fg(OutputStyle::Error), scheme.style_fg(OutputStyle::Diagnostic));
    }
}
