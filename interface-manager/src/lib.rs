// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface slots and their ring workers.
//!
//! The [`InterfaceManager`] owns a fixed size table of slots addressed by [`SlotIndex`]. Starting
//! a slot opens the ring transport of its interface and spawns a receive and a transmit worker,
//! which move frames between the rings and the bus held by the shared [`RelayState`].

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc, clippy::cast_possible_truncation)]

mod config;
mod manager;
mod mode;
mod slot;
mod state;
mod worker;

pub use config::{
    DEFAULT_BURST, DEFAULT_CAPACITY, DEFAULT_IFNAME_FORMAT, RelayConfig, RelayConfigBuilder,
    RelayConfigBuilderError,
};
pub use manager::{InterfaceManager, ManagerError};
pub use mode::{RelayMode, SlotIndex};
pub use slot::{SlotCounters, SlotPhase, SlotStats, SlotStatus};
pub use state::{RelayState, ShutdownToken};
pub use worker::WorkerResult;
