//! Logger lifecycle
//!
//! One process-wide channel with a console sink (stderr) and a file sink.
//! The `tracing` subscriber is installed at most once per process; both sinks
//! are switchable writers so [`reset`] can close the current log file and
//! start a fresh one without reinstalling the subscriber.
//!
//! ```rust,ignore
//! let handle = muniprobe_core::logging::setup(&config.logging)?;
//! tracing::info!(path = %handle.path().display(), "logging to file");
//! ```

use crate::config::LoggingConfig;
use crate::error::LoggingError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Active logger configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHandle {
    path: PathBuf,
    console: bool,
}

impl LogHandle {
    /// Current log file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if console output is enabled
    #[inline]
    #[must_use]
    pub fn console(&self) -> bool {
        self.console
    }
}

#[derive(Default)]
struct LoggerState {
    handle: Option<LogHandle>,
    subscriber_installed: bool,
}

static STATE: Lazy<Mutex<LoggerState>> = Lazy::new(|| Mutex::new(LoggerState::default()));
static FILE_SINK: Lazy<FileSink> = Lazy::new(FileSink::default);
static CONSOLE_SINK: Lazy<ConsoleSink> = Lazy::new(ConsoleSink::default);

/// File writer that discards output while detached
#[derive(Clone, Default)]
struct FileSink {
    file: Arc<Mutex<Option<File>>>,
}

impl FileSink {
    fn attach(&self, file: File) {
        *self.file.lock() = Some(file);
    }

    fn detach(&self) {
        if let Some(mut file) = self.file.lock().take() {
            let _ = file.flush();
        }
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for FileSink {
    type Writer = FileSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Stderr writer that can be muted
#[derive(Clone, Default)]
struct ConsoleSink {
    enabled: Arc<AtomicBool>,
}

impl Write for ConsoleSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.enabled.load(Ordering::Relaxed) {
            io::stderr().write(buf)
        } else {
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ConsoleSink {
    type Writer = ConsoleSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Configure logging; later calls return the existing handle
///
/// The first call deletes prior log files sharing the configured stem,
/// opens the log file and installs the global subscriber.
///
/// # Errors
/// Returns error if the log directory or file cannot be prepared, or if the
/// filter directive is invalid
pub fn setup(config: &LoggingConfig) -> Result<LogHandle, LoggingError> {
    let mut state = STATE.lock();
    if let Some(handle) = &state.handle {
        return Ok(handle.clone());
    }
    configure(&mut state, config)
}

/// Close the current log file, delete prior logs and configure again
///
/// # Errors
/// Same as [`setup`]
pub fn reset(config: &LoggingConfig) -> Result<LogHandle, LoggingError> {
    let mut state = STATE.lock();
    FILE_SINK.detach();
    state.handle = None;
    configure(&mut state, config)
}

/// Check if [`setup`] has completed
#[must_use]
pub fn is_configured() -> bool {
    STATE.lock().handle.is_some()
}

/// Path of the active log file
#[must_use]
pub fn current_log_path() -> Option<PathBuf> {
    STATE.lock().handle.as_ref().map(|h| h.path.clone())
}

fn configure(state: &mut LoggerState, config: &LoggingConfig) -> Result<LogHandle, LoggingError> {
    let filter = if state.subscriber_installed {
        None
    } else {
        Some(build_filter(&config.filter)?)
    };

    fs::create_dir_all(&config.dir).map_err(|e| LoggingError::io(&config.dir, e))?;
    let removed = clear_prior_logs(&config.dir, &config.file_name)?;

    let path = config.log_path();
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| LoggingError::io(&path, e))?;
    FILE_SINK.attach(file);
    CONSOLE_SINK.enabled.store(config.console, Ordering::Relaxed);

    if let Some(filter) = filter {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(CONSOLE_SINK.clone());
        let file_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(FILE_SINK.clone());

        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();
        if installed.is_err() {
            tracing::debug!("global subscriber already set, file sink may stay silent");
        }
        state.subscriber_installed = true;
    }

    let handle = LogHandle {
        path,
        console: config.console,
    };
    state.handle = Some(handle.clone());

    tracing::info!(
        path = %handle.path.display(),
        removed,
        "logging configured"
    );
    Ok(handle)
}

fn build_filter(default: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default)
            .map_err(|_| LoggingError::InvalidFilter(default.to_string())),
    }
}

/// Delete `file_name` and its rotated `<stem>.*.log` siblings from `dir`
fn clear_prior_logs(dir: &Path, file_name: &str) -> Result<usize, LoggingError> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let rotated_prefix = format!("{stem}.");

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(LoggingError::io(dir, e)),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_prior_log = path.extension().is_some_and(|ext| ext == "log")
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n == file_name || n.starts_with(&rotated_prefix));
        if !is_prior_log || !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(LoggingError::io(path, e)),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_only_matching_logs() {
        let tmp = tempfile::tempdir().unwrap();
        for name in [
            "muniprobe.log",
            "muniprobe.1.log",
            "other.log",
            "muniprobe.txt",
            "muniprobe-archive.log",
            "muniprobe_old.log",
        ] {
            fs::write(tmp.path().join(name), "x").unwrap();
        }

        let removed = clear_prior_logs(tmp.path(), "muniprobe.log").unwrap();
        assert_eq!(removed, 2);
        assert!(tmp.path().join("other.log").exists());
        assert!(tmp.path().join("muniprobe.txt").exists());
        assert!(!tmp.path().join("muniprobe.1.log").exists());
        assert!(tmp.path().join("muniprobe-archive.log").exists());
        assert!(tmp.path().join("muniprobe_old.log").exists());
    }

    #[test]
    fn missing_dir_clears_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            clear_prior_logs(&tmp.path().join("absent"), "muniprobe.log").unwrap(),
            0
        );
    }

    #[test]
    fn detached_file_sink_discards() {
        let mut sink = FileSink::default();
        assert_eq!(sink.write(b"dropped").unwrap(), 7);

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sink.log");
        sink.attach(File::create(&path).unwrap());
        sink.write_all(b"kept").unwrap();
        sink.detach();
        sink.write_all(b" lost").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "kept");
    }
}
