//! Kernel watch providers: the platform abstraction of the engine.
//!
//! A provider wraps one OS notification primitive behind a common
//! start/run/stop contract. Two families exist: poll-style providers
//! ([`PollProvider`]) block reading serialized records from a
//! [`KernelFacility`] descriptor, and push-style providers
//! ([`StreamProvider`]) forward batches from the OS's own delivery loop.

mod facility;
mod poll;
mod stream;

pub use facility::{KernelFacility, RECORD_HEADER_LEN};
pub use poll::{PollHandle, PollProvider};
pub use stream::{StreamHandle, StreamProvider};

use std::path::Path;

use crate::error::WatchError;
use crate::event::RawEvent;
use crate::normalize::FlagTable;

/// Platform watch primitive behind a uniform lifecycle.
///
/// `start` establishes the platform watch and returns the opaque per-watch
/// resource. `run` is the long-lived blocking operation: it hands raw event
/// batches to `on_batch` until the watch is stopped (`Ok`) or fails
/// unrecoverably (`Err`). `stop` releases the platform resource; it is
/// idempotent and doubles as the cancellation point, waking the blocked
/// `run` so the watch winds down promptly.
pub trait KernelWatchProvider: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    /// The flag mapping table raw events from this provider are normalized
    /// with.
    fn flag_table(&self) -> &'static FlagTable;

    fn start(&self, path: &Path) -> Result<Self::Handle, WatchError>;

    fn run(
        &self,
        handle: &Self::Handle,
        on_batch: &mut dyn FnMut(Vec<RawEvent>),
    ) -> Result<(), WatchError>;

    fn stop(&self, handle: &Self::Handle);
}
