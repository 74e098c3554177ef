//! Logging for taggr-link
//!
//! Installs a `log` backend writing timestamped lines to stderr and,
//! optionally, to an appended log file.

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use crate::config::LogLevel;

/// Timestamp format for log entries
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Global initialization guard
static INIT_LOGGER: Once = Once::new();

/// Logger writing to stderr and an optional file
pub struct TaggrLogger {
    /// File output for logs
    file: Option<Mutex<File>>,
    /// Log level filter
    level: LevelFilter,
    /// Whether to output to stderr
    console_output: bool,
}

impl TaggrLogger {
    /// Create a logger
    pub fn new(level: LevelFilter, file: Option<File>, console_output: bool) -> Self {
        Self {
            file: file.map(Mutex::new),
            level,
            console_output,
        }
    }

    fn format_entry(record: &Record, level: &str) -> String {
        format!(
            "[{}] {} [{}] {}\n",
            Local::now().format(TIMESTAMP_FORMAT),
            level,
            record.module_path().unwrap_or("<unknown>"),
            record.args()
        )
    }
}

impl log::Log for TaggrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if self.console_output {
            let level = match record.level() {
                Level::Error => "\x1B[31mERROR\x1B[0m", // Red
                Level::Warn => "\x1B[33mWARN \x1B[0m",  // Yellow
                Level::Info => "\x1B[32mINFO \x1B[0m",  // Green
                Level::Debug => "\x1B[36mDEBUG\x1B[0m", // Cyan
                Level::Trace => "\x1B[90mTRACE\x1B[0m", // Gray
            };
            let _ = io::stderr().write_all(Self::format_entry(record, level).as_bytes());
        }

        if let Some(file) = &self.file {
            let entry = Self::format_entry(record, record.level().as_str());
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(entry.as_bytes());
                let _ = file.flush();
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Configure logging with the specified level and optionally a log file
///
/// Only the first call in a process installs a logger.
pub fn configure_logging(
    level: LogLevel,
    log_file: Option<PathBuf>,
    console_output: bool,
) -> Result<(), String> {
    let mut result = Ok(());

    INIT_LOGGER.call_once(|| {
        let level_filter = LevelFilter::from(level);

        let file = match &log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        result = Err(format!("Failed to create log directory: {}", e));
                        return;
                    }
                }
                match OpenOptions::new().create(true).append(true).open(path) {
                    Ok(file) => Some(file),
                    Err(e) => {
                        result = Err(format!("Failed to open log file: {}", e));
                        return;
                    }
                }
            }
            None => None,
        };

        let logger = Box::new(TaggrLogger::new(level_filter, file, console_output));
        if let Err(e) = log::set_boxed_logger(logger) {
            result = Err(format!("Failed to set logger: {}", e));
            return;
        }
        log::set_max_level(level_filter);

        log::info!("Logging initialized at level: {}", level);
        if let Some(path) = &log_file {
            log::info!("Log file: {}", path.display());
        }
    });

    result
}
