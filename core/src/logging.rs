//! Logger setup for the `gridslam` binary.
//!
//! Library code only emits `log` records; installing a logger is left to the caller. The
//! binary uses [`init_logger`], which writes timestamped lines tagged with the emitting module
//! to stderr or, when a path is given, appends them to a file.
use chrono::Local;
use env_logger::{Builder, Target};
use log::{LevelFilter, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Level named by `name` (case-insensitive), or `None` if it is not a level.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

/// Configure, but do not install, a logger.
///
/// The parent directories of `log_file` are created as needed and the file is opened in append
/// mode.
pub fn logger_builder(level: LevelFilter, log_file: Option<&Path>) -> Result<Builder> {
    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });
    if let Some(path) = log_file {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    Ok(builder)
}

/// Install the global logger. Unknown level names fall back to `info` with a warning.
///
/// # Errors
/// Fails if the log file cannot be opened or a logger is already installed.
pub fn init_logger(level: &str, log_file: Option<&Path>) -> Result<()> {
    let parsed = parse_level(level);
    logger_builder(parsed.unwrap_or(LevelFilter::Info), log_file)?.try_init()?;
    if parsed.is_none() {
        warn!("unknown log level '{}', using info", level);
    }
    Ok(())
}
