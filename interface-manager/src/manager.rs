// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The interface manager: the table of interface slots and their lifecycle.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use driver::{RingTransport, TransportOpenError, TransportOpener};
use parking_lot::Mutex;

use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

use crate::slot::{Direction, SlotControl, SlotPhase, SlotStats, SlotStatus};
use crate::worker::{self, WorkerContext, WorkerResult};
use crate::{RelayMode, RelayState, SlotIndex};

trace_target!("interface-manager", LevelFilter::INFO, &["relay"]);

/// Longest sleep between reap passes once shutdown was requested.
const FINAL_REAP_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Invalid interface index {index}: table capacity is {capacity}")]
    InvalidIndex { index: u32, capacity: usize },
    #[error(transparent)]
    TransportOpen(#[from] TransportOpenError),
    #[error("Interface slot {0} is not started")]
    NotStarted(SlotIndex),
    #[error("Interface slot {0} is stopping, retry once it is reaped")]
    PendingReap(SlotIndex),
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

struct ActiveSlot<T> {
    name: String,
    transport: Arc<T>,
    control: Arc<SlotControl>,
    stats: Arc<SlotStats>,
    rx: JoinHandle<WorkerResult>,
    tx: JoinHandle<WorkerResult>,
}

impl<T: RingTransport> ActiveSlot<T> {
    fn finished(&self) -> bool {
        self.rx.is_finished() && self.tx.is_finished()
    }

    /// Join both workers and close the transport. Blocks until both workers exit.
    fn release(self, index: SlotIndex) {
        let slot = index.as_u32();
        for (direction, handle) in [(Direction::Rx, self.rx), (Direction::Tx, self.tx)] {
            match handle.join() {
                Ok(Ok(())) => debug!(slot, "Joined {direction} worker"),
                Ok(Err(e)) => warn!(slot, "{direction} worker ended with error: {e}"),
                Err(_) => error!(slot, "{direction} worker panicked"),
            }
        }
        match Arc::try_unwrap(self.transport) {
            Ok(transport) => transport.close(),
            Err(_) => error!(slot, "Transport of {} is still referenced", self.name),
        }
        info!(slot, "Released interface {}", self.name);
    }
}

enum SlotState<T> {
    Unused,
    Active(ActiveSlot<T>),
    PendingReap(ActiveSlot<T>),
}

impl<T> SlotState<T> {
    fn phase(&self) -> SlotPhase {
        match self {
            SlotState::Unused => SlotPhase::Unused,
            SlotState::Active(_) => SlotPhase::Active,
            SlotState::PendingReap(_) => SlotPhase::PendingReap,
        }
    }
}

/// Maps slot indices to interfaces, starting, reconfiguring and stopping their workers.
///
/// Every structural change happens under one lock. Commands never wait for workers: stopping
/// a slot only signals its workers, and [`InterfaceManager::reap`] joins them later.
pub struct InterfaceManager<O: TransportOpener> {
    state: Arc<RelayState>,
    opener: O,
    slots: Mutex<Vec<SlotState<O::Transport>>>,
}

impl<O: TransportOpener> InterfaceManager<O> {
    #[must_use]
    pub fn new(state: Arc<RelayState>, opener: O) -> Self {
        let slots = (0..state.config.capacity).map(|_| SlotState::Unused).collect();
        Self {
            state,
            opener,
            slots: Mutex::new(slots),
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    #[must_use]
    pub fn opener(&self) -> &O {
        &self.opener
    }

    fn position(&self, index: SlotIndex) -> Result<usize, ManagerError> {
        let capacity = self.state.config.capacity;
        if index.as_usize() < capacity {
            Ok(index.as_usize())
        } else {
            Err(ManagerError::InvalidIndex {
                index: index.as_u32(),
                capacity,
            })
        }
    }

    /// Open the interface of slot `index` and spawn its workers.
    fn start(&self, index: SlotIndex, mode: RelayMode) -> Result<ActiveSlot<O::Transport>, ManagerError> {
        let name = self.state.config.interface_name(index);
        let transport = Arc::new(self.opener.open(&name)?);
        let control = Arc::new(SlotControl::new(mode));
        let stats = Arc::new(SlotStats::default());
        let ctx = WorkerContext {
            index,
            state: self.state.clone(),
            transport: transport.clone(),
            control: control.clone(),
            stats: stats.clone(),
        };
        let rx = worker::spawn(Direction::Rx, ctx.clone()).map_err(ManagerError::Spawn)?;
        let tx = match worker::spawn(Direction::Tx, ctx) {
            Ok(tx) => tx,
            Err(e) => {
                control.cancel();
                let _ = rx.join();
                return Err(ManagerError::Spawn(e));
            }
        };
        info!(slot = index.as_u32(), "Started interface {name} in {mode} mode");
        Ok(ActiveSlot {
            name,
            transport,
            control,
            stats,
            rx,
            tx,
        })
    }

    /// Start slot `index` in `mode` if it never was, otherwise just set its mode.
    pub fn ensure_started(&self, index: SlotIndex, mode: RelayMode) -> Result<(), ManagerError> {
        let pos = self.position(index)?;
        let mut slots = self.slots.lock();
        match &slots[pos] {
            SlotState::Active(slot) => {
                slot.control.set_mode(mode);
                debug!(slot = index.as_u32(), "Mode set to {mode}");
                return Ok(());
            }
            SlotState::PendingReap(_) => return Err(ManagerError::PendingReap(index)),
            SlotState::Unused => {}
        }
        slots[pos] = SlotState::Active(self.start(index, mode)?);
        Ok(())
    }

    /// Change the mode of a running slot. Workers pick it up on their next iteration.
    pub fn set_mode(&self, index: SlotIndex, mode: RelayMode) -> Result<(), ManagerError> {
        let pos = self.position(index)?;
        match &self.slots.lock()[pos] {
            SlotState::Active(slot) => {
                slot.control.set_mode(mode);
                debug!(slot = index.as_u32(), "Mode set to {mode}");
                Ok(())
            }
            _ => Err(ManagerError::NotStarted(index)),
        }
    }

    /// Attach or detach slot `index`.
    ///
    /// Detaching signals the workers of the slot and returns; the slot is released by a
    /// later reap pass. Detaching a slot that is not running does nothing.
    /// Attaching a slot that never started starts it bidirectional.
    pub fn set_attached(&self, index: SlotIndex, attached: bool) -> Result<(), ManagerError> {
        let pos = self.position(index)?;
        let mut slots = self.slots.lock();
        let current = std::mem::replace(&mut slots[pos], SlotState::Unused);
        let next = match (current, attached) {
            (SlotState::Unused, true) => {
                SlotState::Active(self.start(index, RelayMode::Bidirectional)?)
            }
            (SlotState::Active(slot), true) => {
                slot.control.set_attached(true);
                SlotState::Active(slot)
            }
            (SlotState::Active(slot), false) => {
                info!(slot = index.as_u32(), "Detaching interface {}", slot.name);
                slot.control.set_attached(false);
                slot.control.cancel();
                SlotState::PendingReap(slot)
            }
            (SlotState::PendingReap(slot), true) => {
                slots[pos] = SlotState::PendingReap(slot);
                return Err(ManagerError::PendingReap(index));
            }
            (other, false) => {
                debug!(slot = index.as_u32(), "Slot is not attached, nothing to detach");
                other
            }
        };
        slots[pos] = next;
        Ok(())
    }

    /// Release every slot whose workers have stopped. Returns the number of slots released.
    ///
    /// A running slot whose workers stopped on their own (fatal transport error) is
    /// released as well.
    pub fn reap(&self) -> usize {
        let mut slots = self.slots.lock();
        let mut released = 0;
        for (pos, entry) in slots.iter_mut().enumerate() {
            let index = SlotIndex(u32::try_from(pos).unwrap_or(u32::MAX));
            let stopped = matches!(entry, SlotState::Active(slot) if slot.control.is_cancelled());
            if stopped && let SlotState::Active(slot) = std::mem::replace(entry, SlotState::Unused) {
                warn!(slot = index.as_u32(), "Interface {} stopped, reaping it", slot.name);
                *entry = SlotState::PendingReap(slot);
            }
            let finished = matches!(entry, SlotState::PendingReap(slot) if slot.finished());
            if finished && let SlotState::PendingReap(slot) = std::mem::replace(entry, SlotState::Unused) {
                slot.release(index);
                released += 1;
            }
        }
        released
    }

    /// Snapshot of slot `index`.
    pub fn status(&self, index: SlotIndex) -> Result<SlotStatus, ManagerError> {
        let pos = self.position(index)?;
        let slots = self.slots.lock();
        let entry = &slots[pos];
        let status = match entry {
            SlotState::Unused => SlotStatus {
                index,
                phase: SlotPhase::Unused,
                interface: None,
                attached: false,
                mode: None,
                counters: Default::default(),
            },
            SlotState::Active(slot) | SlotState::PendingReap(slot) => SlotStatus {
                index,
                phase: entry.phase(),
                interface: Some(slot.name.clone()),
                attached: slot.control.is_attached(),
                mode: Some(slot.control.mode()),
                counters: slot.stats.snapshot(),
            },
        };
        Ok(status)
    }

    /// Snapshots of all slots that are not unused.
    #[must_use]
    pub fn statuses(&self) -> Vec<SlotStatus> {
        let in_use: Vec<SlotIndex> = self
            .slots
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, entry)| !matches!(entry, SlotState::Unused))
            .map(|(pos, _)| SlotIndex(u32::try_from(pos).unwrap_or(u32::MAX)))
            .collect();
        in_use
            .into_iter()
            .filter_map(|index| self.status(index).ok())
            .collect()
    }

    /// Number of slots in the given phase.
    #[must_use]
    pub fn count(&self, phase: SlotPhase) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|entry| entry.phase() == phase)
            .count()
    }

    /// Signal every running slot to stop.
    pub fn stop_all(&self) {
        let mut slots = self.slots.lock();
        for entry in slots.iter_mut() {
            if let SlotState::Active(slot) = std::mem::replace(entry, SlotState::Unused) {
                slot.control.cancel();
                *entry = SlotState::PendingReap(slot);
            } else if let SlotState::PendingReap(slot) = entry {
                slot.control.cancel();
            }
        }
    }

    /// Reap periodically until shutdown is requested, then stop every slot and
    /// keep reaping until all of them are released.
    pub fn run(&self) {
        let interval = self.state.config.reap_interval;
        info!("Interface manager running, reaping every {interval:?}");
        while !self.state.shutdown.wait_timeout(interval) {
            let released = self.reap();
            debug!(
                released,
                active = self.count(SlotPhase::Active),
                pending = self.count(SlotPhase::PendingReap),
                depth = self.state.bus.len(),
                "Reap pass"
            );
        }

        info!("Shutdown requested, stopping all interfaces");
        self.stop_all();
        let tick = interval.min(FINAL_REAP_TICK);
        loop {
            self.reap();
            let pending = self.count(SlotPhase::PendingReap);
            if pending == 0 {
                break;
            }
            debug!("Waiting for {pending} interfaces to stop");
            std::thread::sleep(tick);
        }
        info!("All interfaces released");
    }
}

impl<O: TransportOpener> Drop for InterfaceManager<O> {
    fn drop(&mut self) {
        let slots = std::mem::take(self.slots.get_mut());
        for (pos, entry) in slots.into_iter().enumerate() {
            if let SlotState::Active(slot) | SlotState::PendingReap(slot) = entry {
                slot.control.cancel();
                slot.release(SlotIndex(u32::try_from(pos).unwrap_or(u32::MAX)));
            }
        }
    }
}
