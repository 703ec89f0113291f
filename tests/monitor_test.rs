//! End-to-end tests for the monitor over a scripted kernel facility.
//!
//! The fake facility speaks the poll provider's serialized record format
//! and lets each test script read outcomes (data, failure, close) per
//! watched path.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use dirwatch::{
    ChangeListener, DirectoryMonitor, KernelFacility, ListenerError, PollMask, PollProvider,
    WatchError, WatcherConfig,
};

enum ReadStep {
    Data(Vec<u8>),
    Fail(String),
    Closed,
}

struct FakeDescriptor {
    tx: Sender<ReadStep>,
    rx: Receiver<ReadStep>,
}

#[derive(Clone, Default)]
struct FakeFacility {
    inner: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    feeds: Mutex<HashMap<PathBuf, Sender<ReadStep>>>,
    closes: AtomicUsize,
    fail_init: AtomicBool,
}

impl FakeFacility {
    fn feed(&self, path: &str) -> Sender<ReadStep> {
        self.inner.feeds.lock().unwrap()[Path::new(path)].clone()
    }

    fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    fn refuse_next_init(&self) {
        self.inner.fail_init.store(true, Ordering::SeqCst);
    }
}

impl KernelFacility for FakeFacility {
    type Descriptor = FakeDescriptor;

    fn init(&self, path: &Path, _subscribe_mask: u32) -> Result<Self::Descriptor, WatchError> {
        if self.inner.fail_init.swap(false, Ordering::SeqCst) {
            return Err(WatchError::WatchUnavailable {
                path: path.to_path_buf(),
                reason: "watch descriptor limit reached".to_string(),
            });
        }
        let (tx, rx) = unbounded();
        self.inner
            .feeds
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), tx.clone());
        Ok(FakeDescriptor { tx, rx })
    }

    fn read(&self, descriptor: &Self::Descriptor, buf: &mut [u8]) -> io::Result<usize> {
        match descriptor.rx.recv() {
            Ok(ReadStep::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Ok(ReadStep::Fail(reason)) => Err(io::Error::other(reason)),
            Ok(ReadStep::Closed) | Err(_) => Err(io::Error::other("descriptor closed")),
        }
    }

    fn close(&self, descriptor: &Self::Descriptor) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        let _ = descriptor.tx.send(ReadStep::Closed);
    }
}

/// Serialize one record in the poll wire format.
fn record(flags: u32, name: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&1i32.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf
}

fn close_write(name: &str) -> Vec<u8> {
    record(PollMask::CLOSE_WRITE.bits(), name)
}

fn monitor_over(facility: &FakeFacility) -> DirectoryMonitor<PollProvider<FakeFacility>> {
    let config = WatcherConfig {
        auto_create: false,
        retry_backoff_ms: 5,
        ..WatcherConfig::default()
    };
    DirectoryMonitor::with_config(
        PollProvider::with_config(facility.clone(), &config),
        config,
    )
}

/// Listener that forwards invocations to a channel.
fn recording_listener() -> (impl ChangeListener + 'static, Receiver<(PathBuf, PathBuf)>) {
    let (tx, rx) = unbounded();
    let listener = move |watched: &Path, changed: &Path| -> Result<(), ListenerError> {
        tx.send((watched.to_path_buf(), changed.to_path_buf()))
            .map_err(|e| ListenerError::new(e.to_string()))
    };
    (listener, rx)
}

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(150);

#[test]
fn close_write_event_reaches_the_listener_as_dir_and_name() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (listener, rx) = recording_listener();

    monitor.watch("/tmp/in", listener).unwrap();
    facility
        .feed("/tmp/in")
        .send(ReadStep::Data(close_write("report.csv")))
        .unwrap();

    let (watched, changed) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(watched, Path::new("/tmp/in"));
    assert_eq!(changed, Path::new("report.csv"));
}

#[test]
fn mount_signals_and_nameless_records_are_suppressed() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (listener, rx) = recording_listener();

    monitor.watch("/tmp/in", listener).unwrap();

    // One batch: an unmount signal, a directory-level record with no
    // name, then a real change as an ordering marker.
    let mut batch = record(PollMask::UNMOUNT.bits(), "vol");
    batch.extend_from_slice(&record(PollMask::CLOSE_WRITE.bits(), ""));
    batch.extend_from_slice(&close_write("marker.txt"));
    facility
        .feed("/tmp/in")
        .send(ReadStep::Data(batch))
        .unwrap();

    let (_, changed) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(changed, Path::new("marker.txt"));
    assert!(rx.recv_timeout(QUIET).is_err(), "suppressed events leaked");
}

#[test]
fn second_watch_on_same_path_fails_and_leaves_state_unchanged() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (first, rx) = recording_listener();
    let (second, second_rx) = recording_listener();

    monitor.watch("/tmp/in", first).unwrap();
    let err = monitor.watch("/tmp/in", second).unwrap_err();
    assert!(matches!(err, WatchError::AlreadyWatched { .. }));
    assert_eq!(monitor.watch_count(), 1);

    // The original watch still delivers, to the original listener.
    facility
        .feed("/tmp/in")
        .send(ReadStep::Data(close_write("a.txt")))
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().1, Path::new("a.txt"));
    assert!(second_rx.recv_timeout(QUIET).is_err());
}

#[test]
fn unwatch_twice_releases_the_resource_exactly_once() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (listener, _rx) = recording_listener();

    let id = monitor.watch("/tmp/in", listener).unwrap();

    monitor.unwatch(&id).unwrap();
    assert_eq!(facility.closes(), 1);
    assert_eq!(monitor.watch_count(), 0);

    assert!(matches!(monitor.unwatch(&id), Err(WatchError::NotWatched)));
    assert_eq!(facility.closes(), 1);
}

#[test]
fn unwatch_interrupts_an_idle_blocked_watch_promptly() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (listener, _rx) = recording_listener();

    let id = monitor.watch("/tmp/in", listener).unwrap();
    // No events ever arrive; the worker is parked in the blocking read.
    let started = Instant::now();
    monitor.unwatch(&id).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn distinct_paths_deliver_independently() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (listener_a, rx_a) = recording_listener();
    let (listener_b, rx_b) = recording_listener();

    monitor.watch("/data/a", listener_a).unwrap();
    monitor.watch("/data/b", listener_b).unwrap();

    facility
        .feed("/data/a")
        .send(ReadStep::Data(close_write("only-a.txt")))
        .unwrap();
    facility
        .feed("/data/b")
        .send(ReadStep::Data(close_write("only-b.txt")))
        .unwrap();

    let (watched_a, changed_a) = rx_a.recv_timeout(WAIT).unwrap();
    assert_eq!(watched_a, Path::new("/data/a"));
    assert_eq!(changed_a, Path::new("only-a.txt"));

    let (watched_b, changed_b) = rx_b.recv_timeout(WAIT).unwrap();
    assert_eq!(watched_b, Path::new("/data/b"));
    assert_eq!(changed_b, Path::new("only-b.txt"));

    // An event on A never invokes B's listener, and vice versa.
    assert!(rx_a.recv_timeout(QUIET).is_err());
    assert!(rx_b.recv_timeout(QUIET).is_err());
}

#[test]
fn events_are_delivered_in_kernel_order() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (listener, rx) = recording_listener();

    monitor.watch("/tmp/in", listener).unwrap();

    let mut batch = close_write("1.txt");
    batch.extend_from_slice(&close_write("2.txt"));
    batch.extend_from_slice(&record(PollMask::MOVED_TO.bits(), "3.txt"));
    let feed = facility.feed("/tmp/in");
    feed.send(ReadStep::Data(batch)).unwrap();
    feed.send(ReadStep::Data(close_write("4.txt"))).unwrap();

    for expected in ["1.txt", "2.txt", "3.txt", "4.txt"] {
        let (_, changed) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(changed, Path::new(expected));
    }
}

#[test]
fn read_failures_within_the_retry_budget_do_not_fail_the_watch() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let errors = monitor.errors();
    let (listener, rx) = recording_listener();

    monitor.watch("/tmp/in", listener).unwrap();

    let feed = facility.feed("/tmp/in");
    for _ in 0..3 {
        feed.send(ReadStep::Fail("transient".to_string())).unwrap();
    }
    feed.send(ReadStep::Data(close_write("survived.txt")))
        .unwrap();

    // The batch after the third failure is still delivered.
    assert_eq!(rx.recv_timeout(WAIT).unwrap().1, Path::new("survived.txt"));
    assert!(errors.try_recv().is_err(), "no failure within the budget");
    assert_eq!(monitor.watch_count(), 1);
}

#[test]
fn a_fourth_consecutive_read_failure_fails_the_watch() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let errors = monitor.errors();
    let (listener, _rx) = recording_listener();

    monitor.watch("/tmp/in", listener).unwrap();

    let feed = facility.feed("/tmp/in");
    for _ in 0..4 {
        feed.send(ReadStep::Fail("stream torn down".to_string()))
            .unwrap();
    }

    let err = errors.recv_timeout(WAIT).unwrap();
    match err {
        WatchError::WatchFailed { path, attempts, .. } => {
            assert_eq!(path, Path::new("/tmp/in"));
            assert_eq!(attempts, 4);
        }
        other => panic!("expected WatchFailed, got {other:?}"),
    }

    // The failed watch released its resource and left the registry, so
    // the caller may watch the same path again.
    assert_eq!(monitor.watch_count(), 0);
    assert_eq!(facility.closes(), 1);
    let (listener, _rx) = recording_listener();
    monitor.watch("/tmp/in", listener).unwrap();
}

#[test]
fn listener_errors_are_reported_and_do_not_stop_delivery() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let errors = monitor.errors();

    let (tx, rx) = unbounded();
    let listener = move |watched: &Path, changed: &Path| -> Result<(), ListenerError> {
        if changed == Path::new("bad.txt") {
            return Err(ListenerError::new("handler rejected file"));
        }
        tx.send((watched.to_path_buf(), changed.to_path_buf()))
            .map_err(|e| ListenerError::new(e.to_string()))
    };

    monitor.watch("/tmp/in", listener).unwrap();

    let mut batch = close_write("bad.txt");
    batch.extend_from_slice(&close_write("good.txt"));
    facility
        .feed("/tmp/in")
        .send(ReadStep::Data(batch))
        .unwrap();

    // The failure is observable and the next event still arrives.
    match errors.recv_timeout(WAIT).unwrap() {
        WatchError::Listener { changed, .. } => assert_eq!(changed, Path::new("bad.txt")),
        other => panic!("expected Listener error, got {other:?}"),
    }
    assert_eq!(rx.recv_timeout(WAIT).unwrap().1, Path::new("good.txt"));
    assert_eq!(monitor.watch_count(), 1);
}

#[test]
fn empty_path_is_rejected() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (listener, _rx) = recording_listener();

    let err = monitor.watch("", listener).unwrap_err();
    assert!(matches!(err, WatchError::WatchUnavailable { .. }));
    assert_eq!(monitor.watch_count(), 0);
}

#[test]
fn facility_refusal_surfaces_as_watch_unavailable() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);
    let (listener, _rx) = recording_listener();

    facility.refuse_next_init();
    let err = monitor.watch("/tmp/in", listener).unwrap_err();
    assert!(matches!(err, WatchError::WatchUnavailable { .. }));
    assert_eq!(monitor.watch_count(), 0);

    // The refusal was transient; the next attempt goes through.
    let (listener, _rx) = recording_listener();
    monitor.watch("/tmp/in", listener).unwrap();
}

#[test]
fn a_stale_id_cannot_cancel_a_newer_watch_on_the_same_path() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);

    let (listener, _rx) = recording_listener();
    let first = monitor.watch("/tmp/in", listener).unwrap();
    monitor.unwatch(&first).unwrap();

    let (listener, _rx) = recording_listener();
    let second = monitor.watch("/tmp/in", listener).unwrap();

    assert!(matches!(
        monitor.unwatch(&first),
        Err(WatchError::NotWatched)
    ));
    assert_eq!(monitor.watch_count(), 1);

    monitor.unwatch(&second).unwrap();
    assert_eq!(monitor.watch_count(), 0);
}

#[test]
fn shutdown_stops_every_watch() {
    let facility = FakeFacility::default();
    let monitor = monitor_over(&facility);

    let (listener_a, _rx_a) = recording_listener();
    let (listener_b, _rx_b) = recording_listener();
    monitor.watch("/data/a", listener_a).unwrap();
    monitor.watch("/data/b", listener_b).unwrap();

    monitor.shutdown();
    assert_eq!(monitor.watch_count(), 0);
    assert_eq!(facility.closes(), 2);
}
