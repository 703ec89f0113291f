//! Table-driven normalization of raw provider events.
//!
//! Each provider family contributes a [`FlagTable`]: the mask it subscribes
//! with plus an ordered list of [`FlagRule`]s mapping flag sets to a
//! [`ChangeKind`] or to suppression. Supporting a new platform means adding
//! a table, not new control flow.

use std::path::Path;

use bitflags::bitflags;

use crate::event::{ChangeEvent, ChangeKind, RawEvent};

bitflags! {
    /// Flag bits used by poll-style providers.
    ///
    /// Values follow the inotify mask layout, which is the wire format the
    /// poll provider decodes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollMask: u32 {
        const MODIFY      = 0x0000_0002;
        const CLOSE_WRITE = 0x0000_0008;
        const MOVED_TO    = 0x0000_0080;
        const CREATE      = 0x0000_0100;
        const UNMOUNT     = 0x0000_2000;
        const Q_OVERFLOW  = 0x0000_4000;
        const IGNORED     = 0x0000_8000;
        const ISDIR       = 0x4000_0000;
    }
}

bitflags! {
    /// Flag bits emitted by push-style stream providers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StreamMask: u32 {
        const CREATED    = 1 << 0;
        const MODIFIED   = 1 << 1;
        const RENAMED_TO = 1 << 2;
        const REMOVED    = 1 << 3;
        const MOUNTED    = 1 << 4;
        const UNMOUNTED  = 1 << 5;
    }
}

/// What a matched rule does with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Drop the event; it is not a content change.
    Suppress,
    /// Emit a change event of the given kind.
    Emit(ChangeKind),
}

/// One row of a mapping table: if any bit of `mask` is set on the raw
/// event, `outcome` applies.
#[derive(Debug)]
pub struct FlagRule {
    pub mask: u32,
    pub outcome: Outcome,
}

/// Per-platform mapping policy.
///
/// Rules are evaluated in order; the first match wins, so suppression rows
/// (mount, unmount, queue overflow) come first. Events matching no rule are
/// suppressed.
#[derive(Debug)]
pub struct FlagTable {
    /// Short platform family name, used in log output.
    pub platform: &'static str,
    /// Mask passed to the kernel facility at subscription time.
    pub subscribe_mask: u32,
    pub rules: &'static [FlagRule],
}

/// Mapping table for poll-style (inotify-like) providers.
pub static POLL_TABLE: FlagTable = FlagTable {
    platform: "poll",
    subscribe_mask: PollMask::CLOSE_WRITE.bits() | PollMask::MOVED_TO.bits(),
    rules: &[
        FlagRule {
            mask: PollMask::UNMOUNT.bits() | PollMask::Q_OVERFLOW.bits() | PollMask::IGNORED.bits(),
            outcome: Outcome::Suppress,
        },
        FlagRule {
            mask: PollMask::CLOSE_WRITE.bits(),
            outcome: Outcome::Emit(ChangeKind::Created),
        },
        FlagRule {
            mask: PollMask::MOVED_TO.bits(),
            outcome: Outcome::Emit(ChangeKind::RenamedInto),
        },
    ],
};

/// Mapping table for push-style (run-loop) providers.
pub static STREAM_TABLE: FlagTable = FlagTable {
    platform: "stream",
    subscribe_mask: StreamMask::CREATED.bits()
        | StreamMask::MODIFIED.bits()
        | StreamMask::RENAMED_TO.bits(),
    rules: &[
        FlagRule {
            mask: StreamMask::MOUNTED.bits() | StreamMask::UNMOUNTED.bits(),
            outcome: Outcome::Suppress,
        },
        FlagRule {
            mask: StreamMask::CREATED.bits(),
            outcome: Outcome::Emit(ChangeKind::Created),
        },
        FlagRule {
            mask: StreamMask::RENAMED_TO.bits(),
            outcome: Outcome::Emit(ChangeKind::RenamedInto),
        },
        FlagRule {
            mask: StreamMask::MODIFIED.bits(),
            outcome: Outcome::Emit(ChangeKind::Modified),
        },
    ],
};

/// Converts raw provider records into normalized change events.
#[derive(Debug, Clone, Copy)]
pub struct EventNormalizer {
    table: &'static FlagTable,
}

impl EventNormalizer {
    pub fn new(table: &'static FlagTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &'static FlagTable {
        self.table
    }

    /// Map a raw event to a change event, or `None` when suppressed.
    ///
    /// Events with an empty name carry no actionable change target and are
    /// always suppressed, whatever their flags.
    pub fn normalize(&self, watched_path: &Path, raw: &RawEvent) -> Option<ChangeEvent> {
        if raw.name.is_empty() {
            return None;
        }
        for rule in self.table.rules {
            if raw.flags & rule.mask != 0 {
                return match rule.outcome {
                    Outcome::Suppress => None,
                    Outcome::Emit(kind) => Some(ChangeEvent {
                        watched_path: watched_path.to_path_buf(),
                        changed_path: raw.name.clone().into(),
                        kind,
                    }),
                };
            }
        }
        None
    }
}
