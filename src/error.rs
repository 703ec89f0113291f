//! Error types for the watch engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watch operations.
///
/// Registration errors (`PlatformUnsupported`, `WatchUnavailable`,
/// `AlreadyWatched`) are returned synchronously from
/// [`DirectoryMonitor::watch`](crate::DirectoryMonitor::watch). Run-time
/// errors (`WatchFailed`, `Listener`) are delivered through the monitor's
/// error channel; they never terminate the process.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("kernel watch facility is not available on this platform: {reason}")]
    PlatformUnsupported { reason: String },

    #[error("cannot watch {path}: {reason}")]
    WatchUnavailable { path: PathBuf, reason: String },

    #[error("{path} is already being watched")]
    AlreadyWatched { path: PathBuf },

    #[error("watch is not active")]
    NotWatched,

    #[error("watch on {path} failed after {attempts} read attempts: {reason}")]
    WatchFailed {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    #[error("listener for {path} failed on {changed}: {reason}")]
    Listener {
        path: PathBuf,
        changed: PathBuf,
        reason: String,
    },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        use notify::ErrorKind;

        let path = e.paths.first().cloned().unwrap_or_default();
        let reason = e.to_string();
        match e.kind {
            ErrorKind::PathNotFound
            | ErrorKind::WatchNotFound
            | ErrorKind::MaxFilesWatch
            | ErrorKind::Io(_) => WatchError::WatchUnavailable { path, reason },
            _ => WatchError::PlatformUnsupported { reason },
        }
    }
}
