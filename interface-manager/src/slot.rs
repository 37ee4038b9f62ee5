// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::{RelayMode, SlotIndex};

/// Which of the two workers of a slot is asking.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Direction {
    Rx,
    Tx,
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Rx => write!(f, "rx"),
            Direction::Tx => write!(f, "tx"),
        }
    }
}

/// What a worker should do on its next iteration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Gate {
    Open,
    Idle,
    Cancelled,
}

#[derive(Debug, Copy, Clone)]
struct Flags {
    attached: bool,
    mode: RelayMode,
    cancelled: bool,
}

/// The flags of a slot shared between the manager and the two workers.
///
/// The manager writes, the workers read. Any change wakes workers idling in [`SlotControl::gate`].
pub(crate) struct SlotControl {
    flags: Mutex<Flags>,
    changed: Condvar,
}

impl SlotControl {
    pub(crate) fn new(mode: RelayMode) -> Self {
        Self {
            flags: Mutex::new(Flags {
                attached: true,
                mode,
                cancelled: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Flags)) {
        f(&mut self.flags.lock());
        self.changed.notify_all();
    }

    pub(crate) fn set_mode(&self, mode: RelayMode) {
        self.update(|flags| flags.mode = mode);
    }

    pub(crate) fn set_attached(&self, attached: bool) {
        self.update(|flags| flags.attached = attached);
    }

    pub(crate) fn cancel(&self) {
        self.update(|flags| flags.cancelled = true);
    }

    pub(crate) fn mode(&self) -> RelayMode {
        self.flags.lock().mode
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.flags.lock().attached
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.flags.lock().cancelled
    }

    /// Tell a worker whether to relay now. If its direction is not currently permitted,
    /// block up to `timeout` for a change of flags and report [`Gate::Idle`].
    pub(crate) fn gate(&self, direction: Direction, timeout: Duration) -> Gate {
        let permitted = |flags: &Flags| match direction {
            Direction::Rx => flags.mode.permits_rx(),
            Direction::Tx => flags.mode.permits_tx(),
        };
        let mut flags = self.flags.lock();
        if flags.cancelled {
            return Gate::Cancelled;
        }
        if permitted(&flags) {
            return Gate::Open;
        }
        let _ = self.changed.wait_for(&mut flags, timeout);
        if flags.cancelled {
            Gate::Cancelled
        } else {
            Gate::Idle
        }
    }

    /// Sleep up to `timeout` unless cancelled. Returns true if the slot got cancelled.
    pub(crate) fn sleep(&self, timeout: Duration) -> bool {
        let mut flags = self.flags.lock();
        if !flags.cancelled {
            let _ = self
                .changed
                .wait_while_for(&mut flags, |flags| !flags.cancelled, timeout);
        }
        flags.cancelled
    }
}

/// Per slot counters.
#[derive(Debug, Default)]
pub struct SlotStats {
    pub rx_frames: AtomicU64,
    pub rx_bytes: AtomicU64,
    pub tx_frames: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub tx_drops: AtomicU64,
    pub poll_timeouts: AtomicU64,
}

impl SlotStats {
    pub(crate) fn count_rx(&self, frames: u64, bytes: u64) {
        self.rx_frames.fetch_add(frames, Ordering::Relaxed);
        self.rx_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
    pub(crate) fn count_tx(&self, frames: u64, bytes: u64) {
        self.tx_frames.fetch_add(frames, Ordering::Relaxed);
        self.tx_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
    pub(crate) fn count_drop(&self) {
        self.tx_drops.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_timeout(&self) {
        self.poll_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> SlotCounters {
        SlotCounters {
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            tx_drops: self.tx_drops.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SlotCounters {
    pub rx_frames: u64,
    pub rx_bytes: u64,
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub tx_drops: u64,
    pub poll_timeouts: u64,
}

/// Lifecycle phase of a slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotPhase {
    Unused,
    Active,
    PendingReap,
}

impl Display for SlotPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotPhase::Unused => write!(f, "unused"),
            SlotPhase::Active => write!(f, "active"),
            SlotPhase::PendingReap => write!(f, "pending-reap"),
        }
    }
}

/// A snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub index: SlotIndex,
    pub phase: SlotPhase,
    pub interface: Option<String>,
    pub attached: bool,
    pub mode: Option<RelayMode>,
    pub counters: SlotCounters,
}

impl Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot {} {}", self.index, self.phase)?;
        if let Some(interface) = &self.interface {
            write!(f, " if:{interface}")?;
        }
        if let Some(mode) = self.mode {
            write!(f, " mode:{mode} attached:{}", self.attached)?;
        }
        let c = &self.counters;
        write!(
            f,
            " rx:{}/{}B tx:{}/{}B drops:{}",
            c.rx_frames, c.rx_bytes, c.tx_frames, c.tx_bytes, c.tx_drops
        )
    }
}
