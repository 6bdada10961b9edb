use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LogsConfig {
    #[serde(default)]
    pub target: LogTarget,

    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogTarget {
    #[serde(rename = "stdout")]
    #[default]
    Stdout,

    #[serde(rename = "stderr")]
    Stderr,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,

    #[serde(rename = "warning")]
    Warning,

    #[serde(rename = "info")]
    #[default]
    Info,

    #[serde(rename = "debug")]
    Debug,
}

impl LogLevel {
    fn filter(&self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

impl LogsConfig {
    pub fn init(&self) -> Result<()> {
        let is_terminal = match self.target {
            LogTarget::Stdout => io::stdout().is_terminal(),
            LogTarget::Stderr => io::stderr().is_terminal(),
        };

        let colors = ColoredLevelConfig::new()
            .info(Color::Green)
            .debug(Color::Magenta);

        let dispatch = fern::Dispatch::new()
            .format(move |out, message, record| {
                let now = humantime::format_rfc3339_millis(std::time::SystemTime::now());
                if is_terminal {
                    out.finish(format_args!(
                        "{now} [{}] {}",
                        colors.color(record.level()),
                        message
                    ))
                } else {
                    out.finish(format_args!("{now} [{}] {}", record.level(), message))
                }
            })
            .level(self.level.filter());

        let dispatch = match self.target {
            LogTarget::Stdout => dispatch.chain(io::stdout()),
            LogTarget::Stderr => dispatch.chain(io::stderr()),
        };
        dispatch.apply().context("init logger")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let cfg: LogsConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.target, LogTarget::Stdout);
        assert_eq!(cfg.level, LogLevel::Info);

        let cfg: LogsConfig = toml::from_str("target = \"stderr\"\nlevel = \"debug\"").unwrap();
        assert_eq!(cfg.target, LogTarget::Stderr);
        assert_eq!(cfg.level.filter(), LevelFilter::Debug);

        assert!(toml::from_str::<LogsConfig>("level = \"trace\"").is_err());
    }
}
