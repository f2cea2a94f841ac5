//! File logging driven by the `[logging]` section of the config
//!
//! The log is rotated once at startup: an oversized `bt-profile-switcher.log`
//! becomes `.log.1`, older backups shift up, and backups past `max_files` are
//! deleted.

use crate::error::{AppError, Result};
use crate::settings::config::LoggingConfig;
use log::LevelFilter;
use simplelog::{CombinedLogger, ConfigBuilder, SharedLogger, WriteLogger};
#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOG_FILE_NAME: &str = "bt-profile-switcher.log";

/// Level used when the configured one is not recognized
const FALLBACK_LEVEL: LevelFilter = LevelFilter::Info;

/// Size-based rotation of one log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub max_bytes: u64,
    /// Backups kept next to the live file; 0 discards an oversized log
    pub keep: u32,
}

impl Rotation {
    fn backup(path: &Path, n: u32) -> PathBuf {
        path.with_extension(format!("log.{}", n))
    }

    /// Rotate `path` if it has grown past `max_bytes`; `true` when it was moved away
    pub fn apply(&self, path: &Path) -> Result<bool> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(false),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        if self.keep == 0 {
            fs::remove_file(path)?;
            return Ok(true);
        }

        let oldest = Self::backup(path, self.keep);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.keep).rev() {
            let from = Self::backup(path, n);
            if from.exists() {
                fs::rename(&from, Self::backup(path, n + 1))?;
            }
        }
        fs::rename(path, Self::backup(path, 1))?;
        Ok(true)
    }
}

/// Where and how much the app logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub path: PathBuf,
    pub level: LevelFilter,
    /// The configured level string when it could not be parsed
    pub unknown_level: Option<String>,
    pub rotation: Rotation,
}

impl LogTarget {
    pub fn new(log_dir: &Path, config: &LoggingConfig) -> Self {
        let parsed = parse_level(&config.level);
        Self {
            path: log_dir.join(LOG_FILE_NAME),
            level: parsed.unwrap_or(FALLBACK_LEVEL),
            unknown_level: parsed.is_none().then(|| config.level.clone()),
            rotation: Rotation {
                max_bytes: config.max_file_size,
                keep: config.max_files,
            },
        }
    }
}

/// `log` level names plus the `warning` alias; case-insensitive
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    let level = level.trim();
    if level.eq_ignore_ascii_case("warning") {
        return Some(LevelFilter::Warn);
    }
    level.parse().ok()
}

/// Rotate, open and install the file logger (plus a terminal logger in debug builds)
pub fn init(target: &LogTarget) -> Result<()> {
    if let Some(dir) = target.path.parent() {
        fs::create_dir_all(dir)?;
    }
    let rotated = target.rotation.apply(&target.path)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&target.path)
        .map_err(AppError::IoError)?;

    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .set_location_level(LevelFilter::Debug)
        .set_thread_level(LevelFilter::Debug)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        target.level,
        log_config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));
    loggers.push(WriteLogger::new(target.level, log_config, log_file));

    CombinedLogger::init(loggers)
        .map_err(|e| AppError::ConfigError(format!("Logger init failed: {}", e)))?;

    log::info!("Logging to {} at {}", target.path.display(), target.level);
    if rotated {
        log::debug!("Previous log rotated ({} backups kept)", target.rotation.keep);
    }
    if let Some(level) = &target.unknown_level {
        log::warn!("Unknown log level '{}', using {}", level, FALLBACK_LEVEL);
    }
    Ok(())
}
