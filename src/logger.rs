//! Session logger: backend for the `log` facade that writes every record to
//! a single file in the OS data directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent run.
//!
//! Log location:
//!   Windows:  `%APPDATA%\blendfill\blendfill.log`
//!   Linux:    `~/.local/share/blendfill/blendfill.log`
//!   macOS:    `~/Library/Application Support/blendfill/blendfill.log`
//!
//! Level defaults to `info`; `BLENDFILL_LOG=debug` (or `trace`, `warn`, …)
//! overrides it and `--verbose` forces `debug` plus a mirror to stderr.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "BLENDFILL_LOG";

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

struct SessionLogger {
    file: Option<Mutex<File>>,
    path: PathBuf,
    level: LevelFilter,
    mirror_stderr: bool,
}

impl SessionLogger {
    /// Write a line to the session file.  I/O errors are ignored so logging
    /// never aborts a fill.
    fn write_line(&self, line: &str) {
        if let Some(mutex) = self.file.as_ref()
            && let Ok(mut file) = mutex.lock()
        {
            let _ = writeln!(file, "{}", line);
        }
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(&timestamp(), record.level(), &record.args().to_string());
        self.write_line(&line);
        if self.mirror_stderr || record.level() == Level::Error {
            eprintln!("{}", line);
        }
    }

    fn flush(&self) {
        if let Some(mutex) = self.file.as_ref()
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

fn format_line(ts: &str, level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", ts, level, msg)
}

/// Parse a level name as used in [`LOG_ENV`].
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    value.trim().parse::<LevelFilter>().ok()
}

/// Returns the path to the current session log file, once initialised.
pub fn log_path() -> Option<&'static PathBuf> {
    LOGGER.get().map(|l| &l.path)
}

/// Initialise the session logger.  Later calls are no-ops.
///
/// * Creates (or truncates) the log file; failure to open it is not fatal.
/// * Registers the logger with the `log` facade.
/// * Installs a panic hook that writes the panic message to the log before
///   running the previous hook.
pub fn init(verbose: bool) {
    if LOGGER.get().is_some() {
        return;
    }
    let level = if verbose {
        LevelFilter::Debug
    } else {
        std::env::var(LOG_ENV)
            .ok()
            .and_then(|v| parse_level(&v))
            .unwrap_or(LevelFilter::Info)
    };

    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };

    let logger = LOGGER.get_or_init(|| SessionLogger {
        file,
        path: path.clone(),
        level,
        mirror_stderr: verbose,
    });
    if log::set_logger(logger).is_err() {
        return;
    }
    log::set_max_level(level);

    logger.write_line(&format!("=== blendfill session started {} ===", human_timestamp()));
    logger.write_line(&format!("Log file: {}", path.display()));
    logger.write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(l) = LOGGER.get() {
            l.write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        }
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("blendfill").join("blendfill.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// `HH:MM:SS` within the current UTC day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => clock(d.as_secs()),
        Err(_) => "??:??:??".to_string(),
    }
}

fn clock(secs: u64) -> String {
    let h = (secs % 86400) / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_wraps_per_day() {
        assert_eq!(clock(0), "00:00:00");
        assert_eq!(clock(3661), "01:01:01");
        assert_eq!(clock(86400 + 59), "00:00:59");
    }

    #[test]
    fn test_line_format() {
        assert_eq!(format_line("12:00:01", Level::Warn, "empty fill"), "[12:00:01] [WARN] empty fill");
    }

    #[test]
    fn test_parse_level_names() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level(" WARN "), Some(LevelFilter::Warn));
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_log_file_lives_in_app_folder() {
        let p = log_file_path();
        assert!(p.ends_with("blendfill/blendfill.log"));
    }
}
