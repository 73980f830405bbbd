//! File logger for blockterm
//!
//! Routes every `log::info!()` / `log::debug!()` etc. from all crates to one
//! file, so diagnostics never interleave with the shell output the binary
//! prints.
//!
//! Level, highest precedence first:
//! - `--log-level` on the command line
//! - `BLOCKTERM_LOG` environment variable (`off|error|warn|info|debug|trace`)
//! - `log_level` in the config file
//!
//! All output goes to `$TMPDIR/blockterm_debug.log`.

use blockterm_config::LogLevel;
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable that overrides the configured level
pub const LOG_ENV: &str = "BLOCKTERM_LOG";

/// Global debug logger
struct DebugLogger {
    level: LevelFilter,
    file: Option<std::fs::File>,
}

impl DebugLogger {
    fn new(level: LevelFilter) -> Self {
        if level == LevelFilter::Off {
            return DebugLogger { level, file: None };
        }

        match OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(log_path())
        {
            Ok(f) => {
                // Write header
                let mut logger = DebugLogger {
                    level,
                    file: Some(f),
                };
                logger.write_raw(&format!(
                    "\n{}\nblockterm {} debug session started at {} (level={})\n{}\n",
                    "=".repeat(80),
                    crate::VERSION,
                    get_timestamp(),
                    level,
                    "=".repeat(80)
                ));
                logger
            }
            // Silently fail if log file can't be opened; logging must never
            // interfere with the session output.
            Err(_) => DebugLogger { level, file: None },
        }
    }

    fn write_raw(&mut self, msg: &str) {
        if let Some(ref mut file) = self.file {
            let _ = file.write_all(msg.as_bytes());
            let _ = file.flush();
        }
    }
}

static LOGGER: OnceLock<Mutex<DebugLogger>> = OnceLock::new();

/// `log` facade adapter over the global [`DebugLogger`].
struct LogBridge;

static BRIDGE: LogBridge = LogBridge;

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        LOGGER
            .get()
            .is_some_and(|logger| metadata.level() <= logger.lock().level)
    }

    fn log(&self, record: &Record<'_>) {
        let Some(logger) = LOGGER.get() else {
            return;
        };
        let mut logger = logger.lock();
        if record.level() > logger.level {
            return;
        }
        let line = format_line(record);
        logger.write_raw(&line);
    }

    fn flush(&self) {
        if let Some(logger) = LOGGER.get()
            && let Some(file) = logger.lock().file.as_mut()
        {
            let _ = file.flush();
        }
    }
}

fn format_line(record: &Record<'_>) -> String {
    format!(
        "[{}] [{:<5}] [{}] {}\n",
        get_timestamp(),
        record.level(),
        record.target(),
        record.args()
    )
}

fn get_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

/// Path of the debug log file
pub fn log_path() -> PathBuf {
    std::env::temp_dir().join("blockterm_debug.log")
}

/// Effective level: `BLOCKTERM_LOG` when set and valid, else `configured`.
pub fn resolve_level(configured: LogLevel) -> LogLevel {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| LogLevel::parse(&value))
        .unwrap_or(configured)
}

/// Install the file logger as the `log` backend. Only the first call has any
/// effect.
pub fn init_log_bridge(level: LogLevel) {
    if LOGGER.get().is_some() {
        return;
    }
    let level = level.to_level_filter();
    if LOGGER.set(Mutex::new(DebugLogger::new(level))).is_err() {
        return;
    }
    if log::set_logger(&BRIDGE).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_includes_level_and_target() {
        let line = format_line(
            &Record::builder()
                .args(format_args!("spawned {}", 42))
                .level(log::Level::Warn)
                .target("blockterm::registry")
                .build(),
        );
        assert!(line.contains("[WARN ] [blockterm::registry] spawned 42"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_log_path_is_in_temp_dir() {
        assert_eq!(log_path().parent(), Some(std::env::temp_dir().as_path()));
    }
}
