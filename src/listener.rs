//! Listener capability invoked on qualifying change events.

use std::path::Path;

use thiserror::Error;

/// Error raised by a listener while handling an event.
///
/// Listener failures are caught per-invocation and reported through the
/// monitor's error channel; they never stop delivery of later events.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for ListenerError {
    fn from(e: std::io::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

/// The sink a caller registers with [`DirectoryMonitor::watch`].
///
/// Invoked zero or more times on the watch's own worker thread, once per
/// qualifying change event, in the order the kernel reported them.
/// `changed_path` is the entry name relative to `watched_path` and is never
/// empty.
///
/// [`DirectoryMonitor::watch`]: crate::DirectoryMonitor::watch
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, watched_path: &Path, changed_path: &Path) -> Result<(), ListenerError>;
}

impl<F> ChangeListener for F
where
    F: Fn(&Path, &Path) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_change(&self, watched_path: &Path, changed_path: &Path) -> Result<(), ListenerError> {
        self(watched_path, changed_path)
    }
}
