// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The packet bus: owned packet buffers and the single FIFO queue shared by every ring worker.

#![deny(clippy::all, clippy::pedantic)]

mod buffer;
mod queue;
mod tests;

pub use buffer::PacketBuffer;
pub use queue::PacketQueue;
