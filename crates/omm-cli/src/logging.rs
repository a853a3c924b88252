//! Subscriber setup for the CLI.
//!
//! `LOG_LEVEL` picks the default level and `LOG_FORMAT` picks `text` or `json`.
//! A `RUST_LOG` filter, when present, takes precedence over `LOG_LEVEL`.
//! Everything goes to stderr; stdout carries only the run summary.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tracing::Level;
use tracing_subscriber::{
    fmt as layer_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow!("invalid log format: {s}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Raw `RUST_LOG` directives.
    pub filter_directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            filter_directives: None,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(level) = lookup("LOG_LEVEL") {
            config.level = level
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid log level: {level}"))?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.format = format.parse()?;
        }
        config.filter_directives = lookup("RUST_LOG").filter(|v| !v.trim().is_empty());
        Ok(config)
    }

    fn filter(&self) -> Result<EnvFilter> {
        match &self.filter_directives {
            Some(directives) => {
                EnvFilter::try_new(directives).context("parsing RUST_LOG directives")
            }
            None => Ok(EnvFilter::new(self.level.as_str().to_lowercase())),
        }
    }
}

pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.filter()?;
    let layer = layer_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_to_info_text() {
        let config = LogConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn reads_level_and_format() {
        let config =
            LogConfig::from_lookup(lookup(&[("LOG_LEVEL", "debug"), ("LOG_FORMAT", "JSON")]))
                .expect("config");
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(LogConfig::from_lookup(lookup(&[("LOG_LEVEL", "loud")])).is_err());
        assert!(LogConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn rust_log_directives_take_precedence() {
        let config = LogConfig::from_lookup(lookup(&[
            ("LOG_LEVEL", "warn"),
            ("RUST_LOG", "omm_sync=debug,info"),
        ]))
        .expect("config");
        assert_eq!(config.filter_directives.as_deref(), Some("omm_sync=debug,info"));
        assert!(config.filter().is_ok());
    }
}
