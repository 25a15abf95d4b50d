//! Logging infrastructure for promptfill.
//!
//! Structured file logging with daily rotation to platform-standard directories.
//! The terminal belongs to the editor, so nothing is ever written to stderr.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use directories::ProjectDirs;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};

/// Prefix of every log file written by the rolling appender.
const LOG_FILE_PREFIX: &str = "promptfill";

/// Handle for swapping the active filter after startup.
pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Result of initializing the logging system.
pub struct LoggingContext {
    /// Guard that must be held for the application lifetime to ensure logs are flushed.
    pub _guard: WorkerGuard,
    /// The session ID for this invocation.
    pub session_id: String,
    /// The directory where logs are written.
    pub log_directory: PathBuf,
    /// Handle for changing the log level once config has been read.
    pub level_handle: Arc<Mutex<ReloadHandle>>,
    /// `RUST_LOG` was set; config levels must not override it.
    pub filter_from_env: bool,
}

impl LoggingContext {
    /// Applies the configured level unless `RUST_LOG` already chose one.
    pub fn apply_config_level(&self, level: &str) {
        if self.filter_from_env {
            return;
        }
        if let Err(e) = update_log_level(&self.level_handle, level) {
            tracing::warn!(level, error = %e, "log_level_update_failed");
        }
    }
}

/// Error that occurred during logging initialization.
#[derive(Debug)]
pub struct LoggingError {
    pub message: String,
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LoggingError {}

/// Generates a 6-character random hex session ID.
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 3] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Initializes the logging system.
///
/// The returned `WorkerGuard` must be held for the application lifetime.
pub fn init() -> Result<LoggingContext, LoggingError> {
    let session_id = generate_session_id();

    let project_dirs =
        ProjectDirs::from("dev", "promptfill", "promptfill").ok_or_else(|| LoggingError {
            message: "Failed to determine platform directories".to_string(),
        })?;

    // macOS: ~/Library/Logs/promptfill/
    // Linux: ~/.local/state/promptfill/
    // Windows: %LocalAppData%\promptfill\
    let log_dir = if cfg!(target_os = "macos") {
        dirs_home_log_dir()
    } else {
        project_dirs
            .state_dir()
            .map(PathBuf::from)
            .or_else(|| Some(project_dirs.data_local_dir().to_path_buf()))
    }
    .ok_or_else(|| LoggingError {
        message: "Failed to determine log directory".to_string(),
    })?;

    fs::create_dir_all(&log_dir).map_err(|e| LoggingError {
        message: format!("Failed to create log directory: {}", e),
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let (env_filter, filter_from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new("info"), false),
    };
    let (filter_layer, level_handle) = reload::Layer::new(env_filter);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| LoggingError {
            message: format!("Failed to install subscriber: {}", e),
        })?;

    info!(session_id = %session_id, version = env!("CARGO_PKG_VERSION"), "session_start");

    Ok(LoggingContext {
        _guard: guard,
        session_id,
        log_directory: log_dir,
        level_handle: Arc::new(Mutex::new(level_handle)),
        filter_from_env,
    })
}

/// Replaces the active filter with one parsed from `level`.
pub fn update_log_level(handle: &Arc<Mutex<ReloadHandle>>, level: &str) -> Result<(), String> {
    let filter = EnvFilter::try_new(level).map_err(|e| format!("Invalid log level: {}", e))?;
    let handle = handle
        .lock()
        .map_err(|_| "Log level handle poisoned".to_string())?;
    handle
        .reload(filter)
        .map_err(|e| format!("Failed to reload filter: {}", e))
}

/// Gets the macOS ~/Library/Logs/promptfill/ directory.
fn dirs_home_log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("Library").join("Logs").join(LOG_FILE_PREFIX))
}

/// Cleans up log files older than the retention period.
///
/// Scans the log directory for `promptfill.*` files and deletes those older than 7 days.
/// Errors are logged at WARN level but don't prevent app startup.
pub fn cleanup_old_logs(log_dir: &Path) {
    use std::time::{Duration, SystemTime};
    use tracing::{debug, warn};

    const RETENTION_DAYS: u64 = 7;
    let retention_duration = Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Failed to read log directory for cleanup");
            return;
        }
    };

    let now = SystemTime::now();
    let mut deleted_count = 0u32;

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if is_log_file_name(name) => name.to_string(),
            _ => continue,
        };

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Failed to read modification time for log file");
                continue;
            }
        };

        // Files from the future are left alone
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };

        if age > retention_duration {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = %file_name, age_days = age.as_secs() / 86400, "Deleted old log file");
                    deleted_count += 1;
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Failed to delete old log file");
                }
            }
        }
    }

    if deleted_count > 0 {
        debug!(count = deleted_count, "Log cleanup completed");
    }
}

/// Rolling files are named `promptfill.YYYY-MM-DD`.
fn is_log_file_name(name: &str) -> bool {
    name.strip_prefix(LOG_FILE_PREFIX)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|suffix| !suffix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn session_id_is_six_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn log_file_name_matching() {
        assert!(is_log_file_name("promptfill.2026-01-02"));
        assert!(!is_log_file_name("promptfill"));
        assert!(!is_log_file_name("promptfill."));
        assert!(!is_log_file_name("other.2026-01-02"));
        assert!(!is_log_file_name("config.toml"));
    }

    #[test]
    fn cleanup_removes_only_old_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let old_log = dir.path().join("promptfill.2020-01-01");
        let fresh_log = dir.path().join("promptfill.2026-10-14");
        let old_other = dir.path().join("notes.txt");
        for path in [&old_log, &fresh_log, &old_other] {
            fs::write(path, "x").unwrap();
        }

        let ten_days_ago = SystemTime::now() - Duration::from_secs(10 * 24 * 60 * 60);
        for path in [&old_log, &old_other] {
            let file = fs::File::options().write(true).open(path).unwrap();
            file.set_modified(ten_days_ago).unwrap();
        }

        cleanup_old_logs(dir.path());

        assert!(!old_log.exists());
        assert!(fresh_log.exists());
        assert!(old_other.exists());
    }

    #[test]
    fn cleanup_tolerates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        cleanup_old_logs(&dir.path().join("missing"));
    }
}
