// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory ring transport for tests.
//!
//! Readiness is deterministic: a poll returns [`Readiness::Ready`] right away if there is work,
//! and otherwise sleeps for the whole timeout before returning [`Readiness::TimedOut`].
//! Frames written to a transmit ring stay in flight until the next sync, unless the transport is
//! "stuck", in which case they stay pending forever.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::{
    Readiness, RingId, RingTransport, TransportError, TransportOp, TransportOpenError,
    TransportOpener, WriteOutcome,
};

#[derive(Debug, Clone, Copy)]
pub struct MockConfig {
    pub rx_rings: u16,
    pub tx_rings: u16,
    /// Slots per transmit ring.
    pub tx_capacity: usize,
    pub max_frame: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            rx_rings: 1,
            tx_rings: 1,
            tx_capacity: 64,
            max_frame: 2048,
        }
    }
}

#[derive(Default)]
struct TxRing {
    in_flight: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

struct Shared {
    name: String,
    config: MockConfig,
    rx: Vec<Mutex<VecDeque<Vec<u8>>>>,
    tx: Vec<Mutex<TxRing>>,
    faulted: AtomicBool,
    stuck: AtomicBool,
    closed: AtomicBool,
    syncs: AtomicUsize,
    polls: AtomicUsize,
}

/// A handle to an in-memory interface. Clones refer to the same rings.
#[derive(Clone)]
pub struct MockTransport(Arc<Shared>);

impl MockTransport {
    #[must_use]
    pub fn new(name: &str, config: MockConfig) -> Self {
        Self(Arc::new(Shared {
            name: name.to_owned(),
            config,
            rx: (0..config.rx_rings).map(|_| Mutex::default()).collect(),
            tx: (0..config.tx_rings).map(|_| Mutex::default()).collect(),
            faulted: AtomicBool::new(false),
            stuck: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            syncs: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }))
    }

    /// Make a frame available on receive ring `ring`.
    pub fn inject(&self, ring: u16, frame: &[u8]) {
        self.0.rx[usize::from(ring)].lock().push_back(frame.to_vec());
    }

    /// Frames still waiting in receive ring `ring`.
    #[must_use]
    pub fn rx_available(&self, ring: u16) -> usize {
        self.0.rx[usize::from(ring)].lock().len()
    }

    /// Frames the "hardware" sent on transmit ring `ring`, in order.
    #[must_use]
    pub fn sent(&self, ring: u16) -> Vec<Vec<u8>> {
        self.0.tx[usize::from(ring)].lock().sent.clone()
    }

    /// Frames written to transmit ring `ring` and not sent yet.
    #[must_use]
    pub fn in_flight(&self, ring: u16) -> usize {
        self.0.tx[usize::from(ring)].lock().in_flight.len()
    }

    /// Make every subsequent readiness wait fail.
    pub fn set_faulted(&self, faulted: bool) {
        self.0.faulted.store(faulted, Ordering::Relaxed);
    }

    /// Keep written frames pending regardless of syncs.
    pub fn set_stuck(&self, stuck: bool) {
        self.0.stuck.store(stuck, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sync_count(&self) -> usize {
        self.0.syncs.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.0.polls.load(Ordering::Relaxed)
    }

    fn check_fault(&self, op: TransportOp) -> Result<(), TransportError> {
        if self.0.faulted.load(Ordering::Relaxed) {
            Err(TransportError::new(&self.0.name, op, "injected fault"))
        } else {
            Ok(())
        }
    }

    fn rx_ready(&self) -> bool {
        self.0.rx.iter().any(|ring| !ring.lock().is_empty())
    }

    fn tx_ready(&self) -> bool {
        self.0
            .tx
            .iter()
            .any(|ring| ring.lock().in_flight.len() < self.0.config.tx_capacity)
    }

    fn wait(
        &self,
        timeout: Duration,
        op: TransportOp,
        ready: impl Fn(&Self) -> bool,
    ) -> Result<Readiness, TransportError> {
        self.0.polls.fetch_add(1, Ordering::Relaxed);
        self.check_fault(op)?;
        if ready(self) {
            return Ok(Readiness::Ready);
        }
        std::thread::sleep(timeout);
        self.check_fault(op)?;
        if ready(self) {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::TimedOut)
        }
    }

    fn tx_ring(&self, ring: RingId, op: TransportOp) -> Result<&Mutex<TxRing>, TransportError> {
        self.0
            .tx
            .get(usize::from(ring.as_u16()))
            .ok_or_else(|| TransportError::new(&self.0.name, op, format!("no tx ring {ring}")))
    }
}

impl RingTransport for MockTransport {
    fn name(&self) -> &str {
        &self.0.name
    }
    fn rx_rings(&self) -> u16 {
        self.0.config.rx_rings
    }
    fn tx_rings(&self) -> u16 {
        self.0.config.tx_rings
    }
    fn max_frame_size(&self) -> usize {
        self.0.config.max_frame
    }

    fn poll_readable(&self, timeout: Duration) -> Result<Readiness, TransportError> {
        self.wait(timeout, TransportOp::PollReadable, Self::rx_ready)
    }

    fn poll_writable(&self, timeout: Duration) -> Result<Readiness, TransportError> {
        self.wait(timeout, TransportOp::PollWritable, Self::tx_ready)
    }

    fn drain_ring(
        &self,
        ring: RingId,
        limit: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, TransportError> {
        let rx = self.0.rx.get(usize::from(ring.as_u16())).ok_or_else(|| {
            TransportError::new(&self.0.name, TransportOp::Drain, format!("no rx ring {ring}"))
        })?;
        let mut rx = rx.lock();
        let mut count = 0;
        while count < limit {
            let Some(frame) = rx.pop_front() else {
                break;
            };
            let len = frame.len().min(self.0.config.max_frame);
            sink(&frame[..len]);
            count += 1;
        }
        Ok(count)
    }

    fn tx_space(&self, ring: RingId) -> Result<usize, TransportError> {
        let tx = self.tx_ring(ring, TransportOp::Write)?.lock();
        Ok(self.0.config.tx_capacity.saturating_sub(tx.in_flight.len()))
    }

    fn write_ring(&self, ring: RingId, payload: &[u8]) -> Result<WriteOutcome, TransportError> {
        let mut tx = self.tx_ring(ring, TransportOp::Write)?.lock();
        if payload.len() > self.0.config.max_frame {
            return Ok(WriteOutcome::Rejected);
        }
        if tx.in_flight.len() >= self.0.config.tx_capacity {
            return Ok(WriteOutcome::RingFull);
        }
        tx.in_flight.push_back(payload.to_vec());
        Ok(WriteOutcome::Written)
    }

    fn sync_transmit(&self) -> Result<(), TransportError> {
        self.0.syncs.fetch_add(1, Ordering::Relaxed);
        if self.0.stuck.load(Ordering::Relaxed) {
            return Ok(());
        }
        for ring in &self.0.tx {
            let mut ring = ring.lock();
            let flushed: Vec<_> = ring.in_flight.drain(..).collect();
            ring.sent.extend(flushed);
        }
        Ok(())
    }

    fn pending_transmit(&self, ring: RingId) -> Result<bool, TransportError> {
        Ok(!self.tx_ring(ring, TransportOp::Pending)?.lock().in_flight.is_empty())
    }

    fn close(self) {
        self.0.closed.store(true, Ordering::Relaxed);
    }
}

/// Opens [`MockTransport`]s on demand and keeps a handle on each so tests can drive them.
#[derive(Default)]
pub struct MockOpener {
    config: MockConfig,
    ports: Mutex<HashMap<String, MockTransport>>,
    unavailable: Mutex<HashSet<String>>,
    opens: AtomicUsize,
}

impl MockOpener {
    #[must_use]
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Make opening `name` fail as if the interface did not exist.
    pub fn make_unavailable(&self, name: &str) {
        self.unavailable.lock().insert(name.to_owned());
    }

    /// The transport most recently opened for `name`.
    #[must_use]
    pub fn transport(&self, name: &str) -> Option<MockTransport> {
        self.ports.lock().get(name).cloned()
    }

    /// How many times a transport was successfully opened.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl TransportOpener for MockOpener {
    type Transport = MockTransport;

    fn open(&self, name: &str) -> Result<MockTransport, TransportOpenError> {
        if self.unavailable.lock().contains(name) {
            return Err(TransportOpenError::NoSuchInterface(name.to_owned()));
        }
        let mut ports = self.ports.lock();
        if ports.get(name).is_some_and(|port| !port.is_closed()) {
            return Err(TransportOpenError::Busy(name.to_owned()));
        }
        let port = MockTransport::new(name, self.config);
        ports.insert(name.to_owned(), port.clone());
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(port)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SHORT: Duration = Duration::from_millis(5);

    #[test]
    fn poll_times_out_without_work() {
        let port = MockTransport::new("eth0", MockConfig::default());
        assert_eq!(port.poll_readable(SHORT).unwrap(), Readiness::TimedOut);
        port.inject(0, b"hello");
        assert_eq!(port.poll_readable(SHORT).unwrap(), Readiness::Ready);
        assert_eq!(port.poll_count(), 2);
    }

    #[test]
    fn drain_respects_limit_and_order() {
        let port = MockTransport::new("eth0", MockConfig::default());
        for i in 0..5u8 {
            port.inject(0, &[i]);
        }
        let mut seen = vec![];
        let n = port
            .drain_ring(RingId(0), 3, &mut |frame: &[u8]| seen.push(frame[0]))
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(port.rx_available(0), 2);
    }

    #[test]
    fn writes_stay_pending_until_synced() {
        let config = MockConfig {
            tx_capacity: 2,
            ..MockConfig::default()
        };
        let port = MockTransport::new("eth0", config);
        let ring = RingId(0);
        assert_eq!(port.write_ring(ring, b"a").unwrap(), WriteOutcome::Written);
        assert_eq!(port.write_ring(ring, b"b").unwrap(), WriteOutcome::Written);
        assert_eq!(port.write_ring(ring, b"c").unwrap(), WriteOutcome::RingFull);
        assert_eq!(port.tx_space(ring).unwrap(), 0);
        assert!(port.pending_transmit(ring).unwrap());

        port.set_stuck(true);
        port.sync_transmit().unwrap();
        assert!(port.pending_transmit(ring).unwrap());

        port.set_stuck(false);
        port.sync_transmit().unwrap();
        assert!(!port.pending_transmit(ring).unwrap());
        assert_eq!(port.sent(0), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(port.sync_count(), 2);
    }

    #[test]
    fn oversized_writes_are_rejected() {
        let config = MockConfig {
            max_frame: 64,
            ..MockConfig::default()
        };
        let port = MockTransport::new("eth0", config);
        let ring = RingId(0);
        assert_eq!(port.write_ring(ring, &[0u8; 65]).unwrap(), WriteOutcome::Rejected);
        assert_eq!(port.write_ring(ring, &[0u8; 64]).unwrap(), WriteOutcome::Written);
        assert_eq!(port.in_flight(0), 1);
    }

    #[test]
    fn faulted_poll_is_an_error() {
        let port = MockTransport::new("eth0", MockConfig::default());
        port.set_faulted(true);
        let err = port.poll_writable(SHORT).unwrap_err();
        assert_eq!(err.op, TransportOp::PollWritable);
        assert_eq!(err.name, "eth0");
    }

    #[test]
    fn opener_refuses_busy_and_unavailable() {
        let opener = MockOpener::new(MockConfig::default());
        opener.make_unavailable("eth9");
        assert!(matches!(
            opener.open("eth9"),
            Err(TransportOpenError::NoSuchInterface(_))
        ));
        let first = opener.open("eth1").unwrap();
        assert!(matches!(opener.open("eth1"), Err(TransportOpenError::Busy(_))));
        first.close();
        assert!(opener.transport("eth1").unwrap().is_closed());
        assert!(opener.open("eth1").is_ok());
        assert_eq!(opener.open_count(), 2);
    }
}
