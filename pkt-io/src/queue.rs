// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The bus: an unbounded FIFO of [`PacketBuffer`]s shared by all ring workers.
//!
//! Every interface pushes what it receives to the tail and every interface pops what it transmits
//! from the head, so any receiving interface can feed any transmitting one. All accesses mutate
//! the queue, so each of them runs under the same exclusive lock and no lock is ever held across
//! a call into a transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, trace};

use crate::PacketBuffer;

trace_target!("relay-bus", LevelFilter::INFO, &["relay"]);

#[derive(Default)]
struct Shared {
    items: Mutex<VecDeque<PacketBuffer>>,
    filled: Condvar,
}

pub struct PacketQueue {
    shared: Arc<Shared>,
}

impl Clone for PacketQueue {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    /// Append a buffer to the tail. Never fails: the queue is unbounded.
    pub fn push_back(&self, buf: PacketBuffer) {
        self.shared.items.lock().push_back(buf);
        self.shared.filled.notify_all();
    }

    /// Append a batch of buffers to the tail in a single critical section, preserving their order.
    /// No other push or pop can interleave with the batch.
    pub fn push_batch(&self, batch: impl IntoIterator<Item = PacketBuffer>) {
        let mut queue = self.shared.items.lock();
        let before = queue.len();
        queue.extend(batch);
        trace!("Enqueued {} buffers, depth is {}", queue.len() - before, queue.len());
        if queue.len() > before {
            self.shared.filled.notify_all();
        }
    }

    /// Remove and return up to `max_n` buffers from the head, in FIFO order.
    /// Returns fewer buffers (possibly none) if the queue holds fewer.
    #[must_use]
    pub fn pop_front_burst(&self, max_n: usize) -> Vec<PacketBuffer> {
        let mut queue = self.shared.items.lock();
        let n = max_n.min(queue.len());
        queue.drain(..n).collect()
    }

    /// Block up to `timeout` until the queue holds something. Returns false if it is still empty.
    pub fn wait_non_empty(&self, timeout: Duration) -> bool {
        let mut queue = self.shared.items.lock();
        if queue.is_empty() {
            let _ = self
                .shared
                .filled
                .wait_while_for(&mut queue, |queue| queue.is_empty(), timeout);
        }
        !queue.is_empty()
    }

    /// Sample the current depth. The value may be stale as soon as it is returned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.items.lock().is_empty()
    }

    /// Drop every queued buffer, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.shared.items.lock();
        let n = queue.len();
        queue.clear();
        debug!("Discarded {n} buffers from the bus");
        n
    }
}
