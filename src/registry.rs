//! Concurrent registry of active watches, keyed by watched path.
//!
//! The registry is the only state shared across watch threads. Lookups on
//! the dispatch path never block registrations on other keys; register and
//! unregister for the same key are serialized by the map, so a lookup can
//! never observe a partially-inserted handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::WatchError;
use crate::handle::WatchHandle;

/// Mapping from watched path to [`WatchHandle`].
///
/// Enforces the one-handle-per-path invariant: a second registration for a
/// path that already has a live handle fails with `AlreadyWatched`.
pub struct WatchRegistry<H> {
    watches: DashMap<PathBuf, Arc<WatchHandle<H>>>,
}

impl<H> WatchRegistry<H> {
    pub fn new() -> Self {
        Self {
            watches: DashMap::new(),
        }
    }

    /// Insert a handle under its watched path.
    pub fn register(&self, handle: Arc<WatchHandle<H>>) -> Result<(), WatchError> {
        match self.watches.entry(handle.path().to_path_buf()) {
            Entry::Occupied(_) => Err(WatchError::AlreadyWatched {
                path: handle.path().to_path_buf(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Resolve the handle for a watched path, if the watch is still live.
    pub fn lookup(&self, path: &Path) -> Option<Arc<WatchHandle<H>>> {
        self.watches.get(path).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.watches.contains_key(path)
    }

    /// Remove the handle for a path.
    pub fn unregister(&self, path: &Path) -> Result<Arc<WatchHandle<H>>, WatchError> {
        self.watches
            .remove(path)
            .map(|(_, handle)| handle)
            .ok_or(WatchError::NotWatched)
    }

    /// Remove the handle for a path only if it belongs to the given watch
    /// generation. A stale id left over from an earlier watch on the same
    /// path removes nothing.
    pub fn remove_matching(&self, path: &Path, seq: u64) -> Option<Arc<WatchHandle<H>>> {
        self.watches
            .remove_if(path, |_, handle| handle.seq() == seq)
            .map(|(_, handle)| handle)
    }

    /// Remove and return every registered handle.
    pub fn drain(&self) -> Vec<Arc<WatchHandle<H>>> {
        let paths: Vec<PathBuf> = self.watches.iter().map(|e| e.key().clone()).collect();
        paths
            .into_iter()
            .filter_map(|path| self.watches.remove(&path).map(|(_, handle)| handle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}

impl<H> Default for WatchRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
