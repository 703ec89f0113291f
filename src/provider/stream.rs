//! Push-style provider over the `notify` crate's platform backends.
//!
//! The OS delivery loop (FSEvents run loop, inotify thread, etc.) lives
//! inside `notify`; this provider translates its events into raw records
//! and hands them to `run` through a bounded channel. `run` blocks on that
//! channel rather than busy-waiting, and `stop` drops the OS watcher and
//! posts a poison message so the blocked receive returns promptly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::config::WatcherConfig;
use crate::error::WatchError;
use crate::event::RawEvent;
use crate::normalize::{FlagTable, STREAM_TABLE, StreamMask};

use super::KernelWatchProvider;

enum StreamSignal {
    Batch(Vec<RawEvent>),
    Lost(String),
    Stop,
}

/// Provider backed by the platform's native push facility, via `notify`.
///
/// Watches are non-recursive: one watch covers one directory, and callers
/// needing subdirectories register each one explicitly.
pub struct StreamProvider {
    queue_capacity: usize,
}

impl StreamProvider {
    pub fn new() -> Self {
        Self::with_config(&WatcherConfig::default())
    }

    pub fn with_config(config: &WatcherConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
        }
    }
}

impl Default for StreamProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform resource for one push-style watch.
pub struct StreamHandle {
    path: PathBuf,
    signal_tx: Sender<StreamSignal>,
    signal_rx: Receiver<StreamSignal>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    stopped: AtomicBool,
}

impl StreamHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl KernelWatchProvider for StreamProvider {
    type Handle = StreamHandle;

    fn flag_table(&self) -> &'static FlagTable {
        &STREAM_TABLE
    }

    fn start(&self, path: &Path) -> Result<Self::Handle, WatchError> {
        let (signal_tx, signal_rx) = bounded(self.queue_capacity);

        let watched = path.to_path_buf();
        let event_tx = signal_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let batch = translate(&watched, event);
                    if !batch.is_empty()
                        && event_tx.try_send(StreamSignal::Batch(batch)).is_err()
                    {
                        // Queue overflow drops the batch, as the kernel's
                        // own overflow does; blocking here would stall the
                        // OS delivery loop.
                        tracing::warn!("[stream] event queue full, dropping batch");
                    }
                }
                Err(e) => {
                    let _ = event_tx.try_send(StreamSignal::Lost(e.to_string()));
                }
            }
        })
        .map_err(|e| WatchError::PlatformUnsupported {
            reason: e.to_string(),
        })?;

        watcher.watch(path, RecursiveMode::NonRecursive)?;

        Ok(StreamHandle {
            path: path.to_path_buf(),
            signal_tx,
            signal_rx,
            watcher: Mutex::new(Some(watcher)),
            stopped: AtomicBool::new(false),
        })
    }

    fn run(
        &self,
        handle: &Self::Handle,
        on_batch: &mut dyn FnMut(Vec<RawEvent>),
    ) -> Result<(), WatchError> {
        loop {
            if handle.is_stopped() {
                return Ok(());
            }
            match handle.signal_rx.recv() {
                Ok(StreamSignal::Batch(batch)) => on_batch(batch),
                Ok(StreamSignal::Stop) | Err(_) => return Ok(()),
                Ok(StreamSignal::Lost(reason)) => {
                    if handle.is_stopped() {
                        return Ok(());
                    }
                    return Err(WatchError::WatchFailed {
                        path: handle.path.clone(),
                        attempts: 1,
                        reason,
                    });
                }
            }
        }
    }

    fn stop(&self, handle: &Self::Handle) {
        if !handle.stopped.swap(true, Ordering::AcqRel) {
            // Dropping the watcher tears down the OS-side stream; the
            // poison message wakes a receive blocked on an empty queue.
            drop(handle.watcher.lock().take());
            let _ = handle.signal_tx.try_send(StreamSignal::Stop);
        }
    }
}

/// Map one `notify` event into raw records against the stream flag table.
///
/// Events on the watched directory itself carry no entry name and are
/// dropped, mirroring the zero-length-name rule of the poll wire format.
fn translate(watched: &Path, event: Event) -> Vec<RawEvent> {
    let flags = stream_mask_for(&event.kind);
    if flags == 0 {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| {
            let name = match path.strip_prefix(watched) {
                Ok(rel) => {
                    if rel.as_os_str().is_empty() {
                        // The watched directory itself; no change target.
                        return None;
                    }
                    rel.to_path_buf()
                }
                Err(_) => PathBuf::from(path.file_name()?),
            };
            Some(RawEvent::new(name.to_string_lossy().into_owned(), flags))
        })
        .collect()
}

fn stream_mask_for(kind: &EventKind) -> u32 {
    match kind {
        EventKind::Create(_) => StreamMask::CREATED.bits(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => StreamMask::RENAMED_TO.bits(),
        EventKind::Modify(ModifyKind::Name(_)) => 0,
        EventKind::Modify(ModifyKind::Metadata(_)) => 0,
        EventKind::Modify(_) => StreamMask::MODIFIED.bits(),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => StreamMask::MODIFIED.bits(),
        EventKind::Remove(_) => StreamMask::REMOVED.bits(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::CreateKind;

    #[test]
    fn translate_strips_the_watched_prefix() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tmp/in/report.csv"));

        let batch = translate(Path::new("/tmp/in"), event);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "report.csv");
        assert_eq!(batch[0].flags, StreamMask::CREATED.bits());
    }

    #[test]
    fn translate_drops_events_on_the_watched_directory_itself() {
        let event = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/tmp/in"));

        assert!(translate(Path::new("/tmp/in"), event).is_empty());
    }

    #[test]
    fn rename_from_and_metadata_changes_are_not_translated() {
        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/tmp/in/old.txt"));
        assert!(translate(Path::new("/tmp/in"), from).is_empty());
    }
}
