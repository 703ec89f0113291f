//! Cross-platform directory-change notification engine.
//!
//! Converts platform-specific kernel event streams into a normalized
//! stream of filesystem change events, delivered to registered listeners,
//! with per-watch lifecycle management across concurrent watches.
//!
//! # Architecture
//!
//! ```text
//! DirectoryMonitor
//!   - WatchRegistry: path -> WatchHandle (listener + provider state)
//!   - One worker thread per watch
//!   - Error channel for run-time failures
//!         |
//!    KernelWatchProvider
//!    +----------------+----------------+
//!    |                                 |
//! PollProvider                  StreamProvider
//! (blocking reads over a        (notify-backed OS
//!  KernelFacility descriptor)    delivery loop)
//!         |
//!    EventNormalizer (per-platform FlagTable)
//!         |
//!    ChangeListener::on_change(watched_path, changed_path)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use dirwatch::{DirectoryMonitor, ListenerError};
//!
//! let monitor = DirectoryMonitor::recommended();
//! let id = monitor.watch("/srv/inbox", |watched: &Path, changed: &Path| {
//!     println!("{} changed in {}", changed.display(), watched.display());
//!     Ok::<(), ListenerError>(())
//! })?;
//! // ...
//! monitor.unwatch(&id)?;
//! # Ok::<(), dirwatch::WatchError>(())
//! ```

pub mod config;
pub mod error;
pub mod event;
mod handle;
pub mod listener;
pub mod logging;
mod monitor;
pub mod normalize;
pub mod provider;
mod registry;

pub use config::{LoggingConfig, Settings, WatcherConfig};
pub use error::WatchError;
pub use event::{ChangeEvent, ChangeKind, RawEvent};
pub use handle::{WatchHandle, WatchId, WatchState};
pub use listener::{ChangeListener, ListenerError};
pub use monitor::DirectoryMonitor;
pub use normalize::{EventNormalizer, FlagRule, FlagTable, Outcome, PollMask, StreamMask};
pub use provider::{
    KernelFacility, KernelWatchProvider, PollProvider, RECORD_HEADER_LEN, StreamProvider,
};
pub use registry::WatchRegistry;
