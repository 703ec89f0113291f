//! Poll-style provider: a blocking read loop over a kernel descriptor.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::WatcherConfig;
use crate::error::WatchError;
use crate::event::RawEvent;
use crate::normalize::{FlagTable, POLL_TABLE};

use super::KernelWatchProvider;
use super::facility::{KernelFacility, decode_batch};

/// Provider for inotify-like facilities: one descriptor per watched path,
/// a fixed-size buffer of serialized records per blocking read.
///
/// Read failures are retried with linear backoff up to the configured
/// budget; the budget resets on every successful read. Exhausting it
/// escalates to [`WatchError::WatchFailed`].
pub struct PollProvider<F: KernelFacility> {
    facility: F,
    table: &'static FlagTable,
    read_buffer_size: usize,
    max_read_retries: u32,
    retry_backoff: Duration,
}

impl<F: KernelFacility> PollProvider<F> {
    pub fn new(facility: F) -> Self {
        Self::with_config(facility, &WatcherConfig::default())
    }

    pub fn with_config(facility: F, config: &WatcherConfig) -> Self {
        Self {
            facility,
            table: &POLL_TABLE,
            read_buffer_size: config.read_buffer_size,
            max_read_retries: config.max_read_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Override the flag table, for facilities whose mask layout differs
    /// from the default poll table.
    pub fn table(mut self, table: &'static FlagTable) -> Self {
        self.table = table;
        self
    }
}

/// Platform resource for one poll-style watch.
pub struct PollHandle<D> {
    path: PathBuf,
    descriptor: D,
    stopped: AtomicBool,
}

impl<D> PollHandle<D> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl<F: KernelFacility> KernelWatchProvider for PollProvider<F> {
    type Handle = PollHandle<F::Descriptor>;

    fn flag_table(&self) -> &'static FlagTable {
        self.table
    }

    fn start(&self, path: &Path) -> Result<Self::Handle, WatchError> {
        let descriptor = self.facility.init(path, self.table.subscribe_mask)?;
        Ok(PollHandle {
            path: path.to_path_buf(),
            descriptor,
            stopped: AtomicBool::new(false),
        })
    }

    fn run(
        &self,
        handle: &Self::Handle,
        on_batch: &mut dyn FnMut(Vec<RawEvent>),
    ) -> Result<(), WatchError> {
        let mut buf = vec![0u8; self.read_buffer_size];
        let mut failures: u32 = 0;

        loop {
            if handle.is_stopped() {
                return Ok(());
            }

            let outcome = self.facility.read(&handle.descriptor, &mut buf);

            // A close-induced read error is the cooperative stop path, not
            // a failure.
            if handle.is_stopped() {
                return Ok(());
            }

            let reason = match outcome {
                Ok(n) if n > 0 => {
                    failures = 0;
                    let batch = decode_batch(&buf[..n]);
                    if !batch.is_empty() {
                        on_batch(batch);
                    }
                    continue;
                }
                Ok(_) => "facility returned no data".to_string(),
                Err(e) => e.to_string(),
            };

            failures += 1;
            if failures > self.max_read_retries {
                return Err(WatchError::WatchFailed {
                    path: handle.path.clone(),
                    attempts: failures,
                    reason,
                });
            }
            crate::debug_event!(
                self.table.platform,
                "read retry",
                "{} (attempt {failures} of {})",
                reason,
                self.max_read_retries
            );
            thread::sleep(self.retry_backoff.saturating_mul(failures));
        }
    }

    fn stop(&self, handle: &Self::Handle) {
        if !handle.stopped.swap(true, Ordering::AcqRel) {
            self.facility.close(&handle.descriptor);
        }
    }
}
