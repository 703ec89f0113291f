//! The directory monitor: watch lifecycle, per-watch worker threads, and
//! the dispatch loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::config::{Settings, WatcherConfig};
use crate::error::WatchError;
use crate::event::RawEvent;
use crate::handle::{WatchHandle, WatchId, WatchState};
use crate::listener::ChangeListener;
use crate::normalize::EventNormalizer;
use crate::provider::{KernelWatchProvider, StreamProvider};
use crate::registry::WatchRegistry;

/// Orchestrates watches over one kernel watch provider.
///
/// Each watch runs its provider loop on a dedicated worker thread, so a
/// slow or blocked watch never stalls delivery for another. The registry
/// is the only state shared across workers; events for a path whose watch
/// was concurrently stopped are dropped silently.
///
/// Run-time failures (`WatchFailed`, listener errors) are reported through
/// the channel returned by [`errors`](Self::errors) and never crash the
/// process; isolation is per-watch.
pub struct DirectoryMonitor<P: KernelWatchProvider> {
    provider: Arc<P>,
    registry: Arc<WatchRegistry<P::Handle>>,
    config: WatcherConfig,
    error_tx: Sender<WatchError>,
    error_rx: Receiver<WatchError>,
    next_seq: AtomicU64,
}

impl<P: KernelWatchProvider> DirectoryMonitor<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, WatcherConfig::default())
    }

    pub fn with_config(provider: P, config: WatcherConfig) -> Self {
        let (error_tx, error_rx) = unbounded();
        Self {
            provider: Arc::new(provider),
            registry: Arc::new(WatchRegistry::new()),
            config,
            error_tx,
            error_rx,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Receiver for asynchronous watch errors.
    ///
    /// Every `WatchFailed` and listener error is observable here; nothing
    /// is silently dropped.
    pub fn errors(&self) -> Receiver<WatchError> {
        self.error_rx.clone()
    }

    /// Number of currently active watches.
    pub fn watch_count(&self) -> usize {
        self.registry.len()
    }

    /// Start watching `path`, delivering qualifying change events to
    /// `listener`.
    ///
    /// The watch covers `path` itself, not its subdirectories; register
    /// each subdirectory as its own watch when recursion is needed.
    pub fn watch(
        &self,
        path: impl Into<PathBuf>,
        listener: impl ChangeListener + 'static,
    ) -> Result<WatchId, WatchError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(WatchError::WatchUnavailable {
                path,
                reason: "watched path must not be empty".to_string(),
            });
        }

        if self.config.auto_create && !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                return Err(WatchError::WatchUnavailable {
                    path,
                    reason: format!("cannot create directory: {e}"),
                });
            }
        }

        if self.registry.contains(&path) {
            return Err(WatchError::AlreadyWatched { path });
        }

        let provider_state = self.provider.start(&path)?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(WatchHandle::new(
            seq,
            path.clone(),
            Box::new(listener),
            provider_state,
        ));

        if let Err(e) = self.registry.register(Arc::clone(&handle)) {
            // Lost a registration race; release the platform resource we
            // just acquired.
            self.provider.stop(handle.provider_state());
            return Err(e);
        }

        let worker = self.spawn_worker(Arc::clone(&handle));
        handle.attach_worker(worker);

        crate::log_event!("monitor", "watching", "{}", path.display());
        Ok(WatchId::new(seq, path))
    }

    /// Stop the watch identified by `id`.
    ///
    /// Succeeds at most once per id: a second call, or a call with an id
    /// from a watch generation that has since been replaced, returns
    /// `NotWatched`. The platform resource is released exactly once.
    pub fn unwatch(&self, id: &WatchId) -> Result<(), WatchError> {
        let handle = self
            .registry
            .remove_matching(id.path(), id.seq())
            .ok_or(WatchError::NotWatched)?;

        self.provider.stop(handle.provider_state());
        self.join_worker(&handle);
        handle.set_state(WatchState::Stopped);

        crate::log_event!("monitor", "unwatched", "{}", id.path().display());
        Ok(())
    }

    /// Stop every remaining watch and wait for its worker to wind down.
    pub fn shutdown(&self) {
        for handle in self.registry.drain() {
            self.provider.stop(handle.provider_state());
            self.join_worker(&handle);
            handle.set_state(WatchState::Stopped);
        }
    }

    fn spawn_worker(&self, handle: Arc<WatchHandle<P::Handle>>) -> thread::JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let registry = Arc::clone(&self.registry);
        let error_tx = self.error_tx.clone();
        let normalizer = EventNormalizer::new(provider.flag_table());

        thread::spawn(move || {
            handle.set_state(WatchState::Active);
            let watched = handle.path().to_path_buf();

            let result = provider.run(handle.provider_state(), &mut |batch| {
                dispatch(&normalizer, &registry, &error_tx, &watched, batch);
            });

            match result {
                Ok(()) => handle.set_state(WatchState::Stopped),
                Err(e) => {
                    handle.set_state(WatchState::Failed);
                    let was_registered = registry.remove_matching(&watched, handle.seq()).is_some();
                    provider.stop(handle.provider_state());
                    if was_registered {
                        tracing::error!("[monitor] watch on {} failed: {e}", watched.display());
                        let _ = error_tx.send(e);
                    } else {
                        // The watch was being stopped anyway; nothing to report.
                        crate::debug_event!("monitor", "late failure", "{e}");
                    }
                }
            }
        })
    }

    /// Wait for the watch's worker thread, unless called from it (a
    /// listener may legitimately stop its own watch).
    fn join_worker(&self, handle: &WatchHandle<P::Handle>) {
        if let Some(worker) = handle.take_worker() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl DirectoryMonitor<StreamProvider> {
    /// Monitor over the best push-style facility for the host platform.
    pub fn recommended() -> Self {
        Self::new(StreamProvider::new())
    }

    /// Like [`recommended`](Self::recommended), configured from settings.
    pub fn recommended_with(settings: &Settings) -> Self {
        Self::with_config(
            StreamProvider::with_config(&settings.watcher),
            settings.watcher.clone(),
        )
    }
}

impl<P: KernelWatchProvider> Drop for DirectoryMonitor<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Deliver one raw batch: normalize each record, resolve the handle by
/// watched path, and invoke its listener exactly once per change event.
fn dispatch<H>(
    normalizer: &EventNormalizer,
    registry: &WatchRegistry<H>,
    error_tx: &Sender<WatchError>,
    watched: &Path,
    batch: Vec<RawEvent>,
) {
    for raw in batch {
        let Some(change) = normalizer.normalize(watched, &raw) else {
            crate::debug_event!("monitor", "suppressed", "{:#x} {}", raw.flags, raw.name);
            continue;
        };

        // Absent means the watch was stopped concurrently; drop the event.
        let Some(handle) = registry.lookup(watched) else {
            continue;
        };

        if let Err(e) = handle
            .listener()
            .on_change(&change.watched_path, &change.changed_path)
        {
            tracing::warn!(
                "[monitor] listener for {} failed on {}: {e}",
                watched.display(),
                change.changed_path.display()
            );
            let _ = error_tx.send(WatchError::Listener {
                path: watched.to_path_buf(),
                changed: change.changed_path,
                reason: e.to_string(),
            });
        }
    }
}
