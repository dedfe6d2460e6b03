// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Process-wide logging setup.
//!
//! All code logs through the `log` macros.  The binary calls `init` once at startup to install an
//! `env_logger` backend that writes to a size-rotated file, to the console, or to both, and keeps
//! the returned `LoggerGuard` alive until shutdown so that pending output is flushed.

use crate::config::{ConfigError, LoggerSettings};
use env_logger::Target;
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use log::{debug, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

/// Logging setup errors.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum LoggingError {
    /// Indicates that the logger settings are invalid.
    #[error("{0}")]
    InvalidConfig(String),

    /// Indicates that the logger could not be installed.
    #[error("Cannot initialize logging: {0}")]
    InitFailed(String),
}

impl From<ConfigError> for LoggingError {
    fn from(e: ConfigError) -> Self {
        LoggingError::InvalidConfig(e.to_string())
    }
}

/// Result type for this module.
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Number of bytes in a megabyte as used by `LoggerSettings::max_size`.
const MEGABYTE: u64 = 1024 * 1024;

/// Length of a day for the purposes of `LoggerSettings::max_age`.
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Time between two passes of the pruner over the rotated log files.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Rotating log file shared between the writer and the guard.
type SharedFile = Arc<Mutex<FileRotate<AppendCount>>>;

/// Writer that duplicates log records to an optional file and, optionally, to stderr.
struct Tee {
    /// Rotating log file, if any.
    file: Option<SharedFile>,

    /// Whether to also write to stderr.
    console: bool,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.file.as_ref() {
            let mut file = file.lock().map_err(|e| io::Error::other(e.to_string()))?;
            file.write_all(buf)?;
            file.flush()?;
        }
        if self.console {
            io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_ref() {
            file.lock().map_err(|e| io::Error::other(e.to_string()))?.flush()?;
        }
        if self.console {
            io::stderr().flush()?;
        }
        Ok(())
    }
}

/// Background thread that deletes old rotated log files until dropped.
struct Pruner {
    /// Channel to wake up the thread; dropping it makes the thread exit.
    stop: Option<mpsc::Sender<()>>,

    /// The pruning thread.
    thread: Option<JoinHandle<()>>,
}

impl Drop for Pruner {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Log pruner thread panicked");
            }
        }
    }
}

/// Starts a thread that runs `prune_backups` on `path` right away and then every `interval`.
fn spawn_pruner(path: PathBuf, max_age: Duration, interval: Duration) -> io::Result<Pruner> {
    let (stop, stopped) = mpsc::channel::<()>();
    let thread = thread::Builder::new().name("log-pruner".to_owned()).spawn(move || {
        loop {
            match prune_backups(&path, max_age, SystemTime::now()) {
                Ok(deleted) => {
                    for path in deleted {
                        debug!("Deleted old log file {}", path.display());
                    }
                }
                Err(e) => warn!("Cannot prune old log files: {}", e),
            }
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => (),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })?;
    Ok(Pruner { stop: Some(stop), thread: Some(thread) })
}

/// Keeps the logging backend's resources alive and flushes them when dropped.
#[must_use]
pub struct LoggerGuard {
    /// Rotating log file, if any.
    file: Option<SharedFile>,

    /// Deleter of old rotated log files, if `max_age` is set.
    pruner: Option<Pruner>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        drop(self.pruner.take());
        log::logger().flush();
        if let Some(file) = self.file.as_ref() {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Opens the rotating log file at `path`.
fn open_file(path: &Path, max_bytes: usize, max_backups: usize, compress: bool) -> SharedFile {
    let compression = if compress { Compression::OnRotate(0) } else { Compression::None };
    let file = FileRotate::new(
        path,
        AppendCount::new(max_backups),
        ContentLimit::Bytes(max_bytes),
        compression,
        #[cfg(unix)]
        None,
    );
    Arc::new(Mutex::new(file))
}

/// Deletes rotated copies of the log file at `path` that were last modified more than `max_age`
/// before `now`.  The live log file is never deleted.
///
/// Returns the paths of the deleted files.
fn prune_backups(path: &Path, max_age: Duration, now: SystemTime) -> io::Result<Vec<PathBuf>> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let prefix = match path.file_name() {
        Some(name) => format!("{}.", name.to_string_lossy()),
        None => return Ok(vec![]),
    };

    let mut deleted = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age {
            fs::remove_file(entry.path())?;
            deleted.push(entry.path());
        }
    }
    Ok(deleted)
}

/// Builds the writer described by `settings` and the guard that flushes it.
fn build_writer(settings: &LoggerSettings) -> LoggingResult<(Tee, LoggerGuard)> {
    if settings.filename.is_empty() {
        let guard = LoggerGuard { file: None, pruner: None };
        return Ok((Tee { file: None, console: true }, guard));
    }

    let path = Path::new(&settings.filename);
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|e| {
                LoggingError::InitFailed(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
    }

    let max_bytes = usize::try_from(settings.max_size.saturating_mul(MEGABYTE)).map_err(|e| {
        LoggingError::InvalidConfig(format!("Invalid max_size {}: {}", settings.max_size, e))
    })?;
    let file = open_file(path, max_bytes, settings.max_backups, settings.compress);
    Ok((
        Tee { file: Some(file.clone()), console: settings.console },
        LoggerGuard { file: Some(file), pruner: None },
    ))
}

/// Installs the process-wide logger described by `settings`.
///
/// This can only succeed once per process.
pub fn init(settings: &LoggerSettings) -> LoggingResult<LoggerGuard> {
    let level = settings.level_filter()?;
    let (tee, mut guard) = build_writer(settings)?;

    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}: {}",
                buf.timestamp_micros(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(tee)))
        .try_init()
        .map_err(|e| LoggingError::InitFailed(e.to_string()))?;

    if !settings.filename.is_empty() && settings.max_age > 0 {
        let max_age = DAY * u32::try_from(settings.max_age).unwrap_or(u32::MAX);
        let path = PathBuf::from(&settings.filename);
        match spawn_pruner(path, max_age, PRUNE_INTERVAL) {
            Ok(pruner) => guard.pruner = Some(pruner),
            Err(e) => warn!("Cannot start log pruner: {}", e),
        }
    }

    Ok(guard)
}
