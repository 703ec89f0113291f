//! Per-watch state: the handle owned by the registry and the caller-facing id.

use std::fmt;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::listener::ChangeListener;

/// Identifies one active watch for later cancellation.
///
/// Ids are generation-checked: an id from a watch that has since been
/// stopped can never cancel a newer watch on the same path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchId {
    seq: u64,
    path: PathBuf,
}

impl WatchId {
    pub(crate) fn new(seq: u64, path: PathBuf) -> Self {
        Self { seq, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }
}

/// Lifecycle of one watch. `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Unstarted,
    Active,
    Stopped,
    Failed,
}

/// Context for one active watch on one path.
///
/// Holds the listener and the provider's platform resource for the watch's
/// lifetime. The watched path is immutable and acts as the registry key;
/// the provider state is released exactly once, through the provider's
/// idempotent `stop`.
pub struct WatchHandle<H> {
    seq: u64,
    watched_path: PathBuf,
    listener: Box<dyn ChangeListener>,
    provider_state: H,
    state: Mutex<WatchState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<H> WatchHandle<H> {
    pub(crate) fn new(
        seq: u64,
        watched_path: PathBuf,
        listener: Box<dyn ChangeListener>,
        provider_state: H,
    ) -> Self {
        Self {
            seq,
            watched_path,
            listener,
            provider_state,
            state: Mutex::new(WatchState::Unstarted),
            worker: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.watched_path
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn listener(&self) -> &dyn ChangeListener {
        self.listener.as_ref()
    }

    pub(crate) fn provider_state(&self) -> &H {
        &self.provider_state
    }

    pub(crate) fn set_state(&self, state: WatchState) {
        *self.state.lock() = state;
    }

    pub(crate) fn attach_worker(&self, worker: JoinHandle<()>) {
        *self.worker.lock() = Some(worker);
    }

    pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().take()
    }
}

impl<H> fmt::Debug for WatchHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("seq", &self.seq)
            .field("watched_path", &self.watched_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
