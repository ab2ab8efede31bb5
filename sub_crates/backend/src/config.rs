//! Runtime configuration, read from the environment.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Inactivity window used to coalesce plain typing, backspacing and
/// forward-deleting into single undo steps.
pub const DEFAULT_GROUP_WINDOW: Duration = Duration::from_millis(900);
pub const DEFAULT_TAB_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub group_window: Duration,
    pub tab_width: usize,
    pub auto_indent: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            group_window: DEFAULT_GROUP_WINDOW,
            tab_width: DEFAULT_TAB_WIDTH,
            auto_indent: true,
        }
    }
}

impl Config {
    /// Builds a config from the defaults, overridden by `LEDIT_GROUP_WINDOW_MS`,
    /// `LEDIT_TAB_WIDTH` and `LEDIT_AUTO_INDENT` when they are set.
    pub fn from_env() -> Config {
        Config::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup("LEDIT_GROUP_WINDOW_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.group_window = Duration::from_millis(ms),
                Err(_) => warn!(%value, "ignoring unparsable LEDIT_GROUP_WINDOW_MS"),
            }
        }

        if let Some(value) = lookup("LEDIT_TAB_WIDTH") {
            match value.trim().parse::<usize>() {
                Ok(width) if width > 0 => config.tab_width = width,
                _ => warn!(%value, "ignoring invalid LEDIT_TAB_WIDTH"),
            }
        }

        if let Some(value) = lookup("LEDIT_AUTO_INDENT") {
            match parse_flag(&value) {
                Some(flag) => config.auto_indent = flag,
                None => warn!(%value, "ignoring unrecognized LEDIT_AUTO_INDENT"),
            }
        }

        config
    }
}

/// Parses a boolean-like flag.  Matching is case-insensitive and ignores
/// surrounding whitespace.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.group_window, Duration::from_millis(900));
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("LEDIT_GROUP_WINDOW_MS", "250"),
            ("LEDIT_TAB_WIDTH", "8"),
            ("LEDIT_AUTO_INDENT", "off"),
        ]));
        assert_eq!(config.group_window, Duration::from_millis(250));
        assert_eq!(config.tab_width, 8);
        assert!(!config.auto_indent);
    }

    #[test]
    fn bad_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("LEDIT_GROUP_WINDOW_MS", "soon"),
            ("LEDIT_TAB_WIDTH", "0"),
            ("LEDIT_AUTO_INDENT", "maybe"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn flags() {
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("nah"), None);
    }
}
