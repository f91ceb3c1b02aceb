//! Logging configuration and initialization.
//!
//! Presets pick sensible levels for the `retro::*` targets. Individual
//! targets can be raised or lowered with `--log target=level`, and a set
//! `RUST_LOG` replaces the whole filter.

use std::collections::HashMap;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Lifecycle events only
    #[default]
    Production,
    /// Plus per-connection and sweep detail
    Verbose,
    /// Everything except ping traffic
    Debug,
    Trace,
    /// Warnings and errors
    Quiet,
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Per-target level overrides, keyed by full target ("retro::hub")
    pub overrides: HashMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        // "hub=debug,ws::ping=trace" style, possibly repeated
        let mut overrides = HashMap::new();
        for override_str in log_overrides {
            for part in override_str.split(',') {
                let Some((target, level_str)) = part.split_once('=') else {
                    continue;
                };
                let target = target.trim();
                let full_target = if target.starts_with("retro::") || target == "tower_http" {
                    target.to_string()
                } else {
                    format!("retro::{}", target)
                };

                if let Some(level) = parse_level(level_str.trim()) {
                    overrides.insert(full_target, level);
                }
            }
        }

        Self {
            preset,
            overrides,
            format,
        }
    }

    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }

        let mut directives: Vec<String> = match self.preset {
            LogPreset::Production => vec![
                "retro::startup=info".into(),
                "retro::api=info".into(),
                "retro::ws=info".into(),
                "retro::ws::ping=off".into(),
                "retro::hub=info".into(),
                "retro::dispatch=warn".into(),
                "retro::store=warn".into(),
                "retro::sweep=info".into(),
                "tower_http=warn".into(),
            ],
            LogPreset::Verbose => vec![
                "retro=info".into(),
                "retro::ws::ping=off".into(),
                "tower_http=info".into(),
            ],
            LogPreset::Debug => vec![
                "retro=debug".into(),
                "retro::ws::ping=off".into(),
                "tower_http=debug".into(),
            ],
            LogPreset::Trace => vec!["retro=trace".into(), "tower_http=trace".into()],
            LogPreset::Quiet => vec!["retro=warn".into(), "tower_http=error".into()],
        };

        for (target, level) in &self.overrides {
            directives.push(format!("{}={}", target, level_to_str(*level)));
        }

        let filter_str = directives.join(",");
        EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &LogConfig) {
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_config_from_cli_preset_priority() {
        let config = LogConfig::from_cli(true, true, true, true, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Quiet);

        let config = LogConfig::from_cli(true, true, true, false, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Trace);

        let config = LogConfig::from_cli(true, true, false, false, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Debug);

        let config = LogConfig::from_cli(true, false, false, false, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Verbose);

        let config = LogConfig::from_cli(false, false, false, false, vec![], LogFormat::Json);
        assert_eq!(config.preset, LogPreset::Production);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_overrides_get_prefixed() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["hub=debug".into(), "ws::ping=trace, sweep=warning".into()],
            LogFormat::Text,
        );

        assert_eq!(config.overrides.get("retro::hub"), Some(&Level::DEBUG));
        assert_eq!(config.overrides.get("retro::ws::ping"), Some(&Level::TRACE));
        assert_eq!(config.overrides.get("retro::sweep"), Some(&Level::WARN));
    }

    #[test]
    fn test_full_targets_and_bad_levels() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec![
                "retro::dispatch=debug".into(),
                "tower_http=trace".into(),
                "store=loud".into(),
                "no-equals-sign".into(),
            ],
            LogFormat::Text,
        );

        assert_eq!(config.overrides.get("retro::dispatch"), Some(&Level::DEBUG));
        assert_eq!(config.overrides.get("tower_http"), Some(&Level::TRACE));
        assert_eq!(config.overrides.len(), 2);
    }
}
