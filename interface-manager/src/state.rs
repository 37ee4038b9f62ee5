// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Process-wide relay state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use pkt_io::PacketQueue;

use crate::RelayConfig;

/// A process-wide request to stop.
///
/// Requesting shutdown only flips a flag and wakes waiters; whoever owns resources
/// observes the request and releases them.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        let (flag, cond) = &*self.inner;
        *flag.lock() = true;
        cond.notify_all();
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for `timeout` or until shutdown is requested, whichever comes first.
    /// Returns true if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cond) = &*self.inner;
        let mut requested = flag.lock();
        if !*requested {
            let _ = cond.wait_while_for(&mut requested, |requested| !*requested, timeout);
        }
        *requested
    }
}

/// State shared by the manager, the control listener and every worker.
///
/// Built once at startup, before any worker is spawned, and passed around by [`Arc`].
pub struct RelayState {
    pub bus: PacketQueue,
    pub config: RelayConfig,
    pub shutdown: ShutdownToken,
}

impl RelayState {
    #[must_use]
    pub fn new(config: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            bus: PacketQueue::new(),
            config,
            shutdown: ShutdownToken::new(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_returns_early_on_request() {
        let token = ShutdownToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(1)));

        let other = token.clone();
        let waiter = std::thread::spawn(move || other.wait_timeout(Duration::from_secs(30)));
        let start = Instant::now();
        token.request();
        assert!(waiter.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(30));
        assert!(token.is_requested());
    }
}
