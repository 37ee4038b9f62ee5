// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ring workers.
//!
//! Every started slot runs two OS threads: a receive worker moving frames from the receive rings
//! of its interface to the tail of the bus, and a transmit worker moving buffers from the head of
//! the bus into the transmit rings. Both exist for the whole life of the slot, whatever its mode;
//! a worker whose direction is not permitted idles on the slot flags instead of polling.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use driver::{Readiness, RingId, RingTransport, TransportError, WriteOutcome};
use pkt_io::PacketBuffer;

use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

use crate::slot::{Direction, Gate, SlotControl, SlotStats};
use crate::{RelayState, SlotIndex};

trace_target!("relay-worker", LevelFilter::INFO, &["relay"]);

/// What a worker exits with.
pub type WorkerResult = Result<(), TransportError>;

/// Everything a worker of one slot may touch.
pub(crate) struct WorkerContext<T> {
    pub(crate) index: SlotIndex,
    pub(crate) state: Arc<RelayState>,
    pub(crate) transport: Arc<T>,
    pub(crate) control: Arc<SlotControl>,
    pub(crate) stats: Arc<SlotStats>,
}

impl<T> Clone for WorkerContext<T> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            state: self.state.clone(),
            transport: self.transport.clone(),
            control: self.control.clone(),
            stats: self.stats.clone(),
        }
    }
}

/// Spawn the worker for `direction` in a thread of its own.
pub(crate) fn spawn<T: RingTransport>(
    direction: Direction,
    ctx: WorkerContext<T>,
) -> io::Result<JoinHandle<WorkerResult>> {
    let name = format!("relay-{direction}-{}", ctx.index);
    thread::Builder::new().name(name).spawn(move || {
        let slot = ctx.index.as_u32();
        info!(slot, "{direction} worker started on {}", ctx.transport.name());
        let result = match direction {
            Direction::Rx => rx_loop(&ctx),
            Direction::Tx => tx_loop(&ctx),
        };
        match &result {
            Ok(()) => info!(slot, "{direction} worker exited"),
            Err(e) => {
                error!(slot, "{direction} worker failed: {e}");
                // the sibling worker must not outlive a dead interface
                ctx.control.cancel();
            }
        }
        result
    })
}

/// Wait for the interface to settle. Returns true if cancelled meanwhile.
fn settle<T: RingTransport>(ctx: &WorkerContext<T>) -> bool {
    let wait = ctx.state.config.phy_reset_wait;
    if wait.is_zero() {
        return ctx.control.is_cancelled();
    }
    debug!(slot = ctx.index.as_u32(), "Waiting {wait:?} for PHY reset");
    ctx.control.sleep(wait)
}

fn rx_loop<T: RingTransport>(ctx: &WorkerContext<T>) -> WorkerResult {
    let timeout = ctx.state.config.poll_timeout;
    if settle(ctx) {
        return Ok(());
    }
    loop {
        match ctx.control.gate(Direction::Rx, timeout) {
            Gate::Cancelled => return Ok(()),
            Gate::Idle => continue,
            Gate::Open => {}
        }
        match ctx.transport.poll_readable(timeout)? {
            Readiness::TimedOut => ctx.stats.count_timeout(),
            Readiness::Ready => receive(ctx)?,
        }
    }
}

/// Drain every receive ring, appending what each ring held to the bus as one batch.
fn receive<T: RingTransport>(ctx: &WorkerContext<T>) -> Result<(), TransportError> {
    let transport = &ctx.transport;
    let max_frame = transport.max_frame_size();
    for ring in RingId::all(transport.rx_rings()) {
        let mut batch = Vec::new();
        let mut bytes = 0u64;
        transport.drain_ring(ring, ctx.state.config.burst, &mut |frame: &[u8]| {
            let frame = &frame[..frame.len().min(max_frame)];
            bytes += frame.len() as u64;
            batch.push(PacketBuffer::copy_from(frame));
        })?;
        if batch.is_empty() {
            continue;
        }
        trace!(
            slot = ctx.index.as_u32(),
            %ring,
            "Received {} frames ({bytes} octets)",
            batch.len()
        );
        ctx.stats.count_rx(batch.len() as u64, bytes);
        ctx.state.bus.push_batch(batch);
    }
    Ok(())
}

fn tx_loop<T: RingTransport>(ctx: &WorkerContext<T>) -> WorkerResult {
    let timeout = ctx.state.config.poll_timeout;
    if settle(ctx) {
        return Ok(());
    }
    loop {
        match ctx.control.gate(Direction::Tx, timeout) {
            Gate::Cancelled => return Ok(()),
            Gate::Idle => continue,
            Gate::Open => {}
        }
        // idle until the bus has something to send
        if !ctx.state.bus.wait_non_empty(timeout) {
            continue;
        }
        if ctx.transport.poll_writable(timeout)? == Readiness::TimedOut {
            ctx.stats.count_timeout();
            continue;
        }
        if transmit(ctx)? > 0 {
            ctx.transport.sync_transmit()?;
            if wait_drained(ctx)? {
                return Ok(());
            }
        }
    }
}

/// Fill the free slots of every transmit ring from the head of the bus.
/// Returns the number of frames written.
fn transmit<T: RingTransport>(ctx: &WorkerContext<T>) -> Result<usize, TransportError> {
    let transport = &ctx.transport;
    let burst = ctx.state.config.burst;
    let mut written = 0;
    for ring in RingId::all(transport.tx_rings()) {
        let mut space = transport.tx_space(ring)?;
        while space > 0 {
            let buffers = ctx.state.bus.pop_front_burst(space.min(burst));
            if buffers.is_empty() {
                break;
            }
            space = space.saturating_sub(buffers.len());
            let mut bytes = 0u64;
            let mut frames = 0u64;
            for buffer in buffers {
                match transport.write_ring(ring, buffer.as_slice())? {
                    WriteOutcome::Written => {
                        frames += 1;
                        bytes += buffer.len() as u64;
                    }
                    WriteOutcome::RingFull => {
                        debug!(slot = ctx.index.as_u32(), %ring, "Ring full, dropping {buffer}");
                        ctx.stats.count_drop();
                        space = 0;
                    }
                    WriteOutcome::Rejected => {
                        debug!(slot = ctx.index.as_u32(), %ring, "Transport refused {buffer}");
                        ctx.stats.count_drop();
                    }
                }
            }
            trace!(slot = ctx.index.as_u32(), %ring, "Wrote {frames} frames ({bytes} octets)");
            ctx.stats.count_tx(frames, bytes);
            written += usize::try_from(frames).unwrap_or(usize::MAX);
        }
    }
    Ok(written)
}

/// Wait until the hardware sent everything written so far, re-checking cancellation between
/// checks. Returns true if the slot got cancelled meanwhile.
fn wait_drained<T: RingTransport>(ctx: &WorkerContext<T>) -> Result<bool, TransportError> {
    let interval = ctx.state.config.drain_interval;
    for ring in RingId::all(ctx.transport.tx_rings()) {
        while ctx.transport.pending_transmit(ring)? {
            if ctx.control.sleep(interval) {
                debug!(slot = ctx.index.as_u32(), %ring, "Cancelled while draining");
                return Ok(true);
            }
            ctx.transport.sync_transmit()?;
        }
    }
    Ok(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{RelayConfigBuilder, RelayMode};
    use driver::TransportOp;
    use driver::mock::{MockConfig, MockTransport};
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    const POLL: Duration = Duration::from_millis(10);

    fn context(mode: RelayMode, transport: &MockTransport) -> WorkerContext<MockTransport> {
        let config = RelayConfigBuilder::default()
            .poll_timeout(POLL)
            .phy_reset_wait(Duration::ZERO)
            .drain_interval(Duration::from_millis(1))
            .burst(4)
            .build()
            .unwrap();
        WorkerContext {
            index: SlotIndex(1),
            state: RelayState::new(config),
            transport: Arc::new(transport.clone()),
            control: Arc::new(SlotControl::new(mode)),
            stats: Arc::new(SlotStats::default()),
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    #[traced_test]
    fn rx_worker_fills_the_bus() {
        let port = MockTransport::new("eth1", MockConfig::default());
        for i in 0..10u8 {
            port.inject(0, &[i; 60]);
        }
        let ctx = context(RelayMode::ReceiveOnly, &port);
        let handle = spawn(Direction::Rx, ctx.clone()).unwrap();
        wait_for(|| ctx.state.bus.len() == 10);
        ctx.control.cancel();
        assert!(handle.join().unwrap().is_ok());

        let popped = ctx.state.bus.pop_front_burst(100);
        let firsts: Vec<u8> = popped.iter().map(|b| b.as_slice()[0]).collect();
        assert_eq!(firsts, (0..10).collect::<Vec<_>>());
        assert_eq!(ctx.stats.snapshot().rx_frames, 10);
        assert_eq!(ctx.stats.snapshot().rx_bytes, 600);
    }

    #[test]
    #[traced_test]
    fn tx_worker_empties_the_bus() {
        let port = MockTransport::new("eth1", MockConfig::default());
        let ctx = context(RelayMode::TransmitOnly, &port);
        for i in 0..9u8 {
            ctx.state.bus.push_back(PacketBuffer::copy_from(&[i, i]));
        }
        let handle = spawn(Direction::Tx, ctx.clone()).unwrap();
        wait_for(|| port.sent(0).len() == 9);
        ctx.control.cancel();
        assert!(handle.join().unwrap().is_ok());
        assert!(ctx.state.bus.is_empty());
        assert_eq!(port.sent(0)[8], vec![8, 8]);
        assert!(port.sync_count() > 0);
        assert_eq!(ctx.stats.snapshot().tx_frames, 9);
    }

    #[test]
    #[traced_test]
    fn refused_frame_is_dropped_not_fatal() {
        let config = MockConfig {
            max_frame: 64,
            ..MockConfig::default()
        };
        let port = MockTransport::new("eth1", config);
        let ctx = context(RelayMode::TransmitOnly, &port);
        ctx.state.bus.push_back(PacketBuffer::copy_from(&[1u8; 100]));
        ctx.state.bus.push_back(PacketBuffer::copy_from(&[2u8; 60]));
        let handle = spawn(Direction::Tx, ctx.clone()).unwrap();
        wait_for(|| port.sent(0).len() == 1);
        assert!(!ctx.control.is_cancelled());
        assert_eq!(port.sent(0)[0], vec![2u8; 60]);

        ctx.state.bus.push_back(PacketBuffer::copy_from(&[3u8; 60]));
        wait_for(|| port.sent(0).len() == 2);
        ctx.control.cancel();
        assert!(handle.join().unwrap().is_ok());
        let counters = ctx.stats.snapshot();
        assert_eq!(counters.tx_drops, 1);
        assert_eq!(counters.tx_frames, 2);
    }

    #[test]
    fn directions_not_permitted_leave_the_bus_alone() {
        let port = MockTransport::new("eth1", MockConfig::default());
        let ctx = context(RelayMode::ReceiveOnly, &port);
        for i in 0..5u8 {
            ctx.state.bus.push_back(PacketBuffer::copy_from(&[i]));
        }
        let tx = spawn(Direction::Tx, ctx.clone()).unwrap();
        thread::sleep(POLL * 5);
        assert_eq!(ctx.state.bus.len(), 5);
        assert!(port.sent(0).is_empty());
        ctx.control.cancel();
        assert!(tx.join().unwrap().is_ok());

        let port = MockTransport::new("eth2", MockConfig::default());
        port.inject(0, b"frame");
        let ctx = context(RelayMode::TransmitOnly, &port);
        let rx = spawn(Direction::Rx, ctx.clone()).unwrap();
        thread::sleep(POLL * 5);
        assert!(ctx.state.bus.is_empty());
        assert_eq!(port.rx_available(0), 1);

        // flipping the mode live lets the idle worker pick up
        ctx.control.set_mode(RelayMode::Bidirectional);
        wait_for(|| ctx.state.bus.len() == 1);
        ctx.control.cancel();
        assert!(rx.join().unwrap().is_ok());
    }

    #[test]
    #[traced_test]
    fn cancellation_interrupts_drain_wait() {
        let port = MockTransport::new("eth1", MockConfig::default());
        port.set_stuck(true);
        let ctx = context(RelayMode::Bidirectional, &port);
        ctx.state.bus.push_back(PacketBuffer::copy_from(b"never leaves"));
        let handle = spawn(Direction::Tx, ctx.clone()).unwrap();
        wait_for(|| port.in_flight(0) == 1);

        let start = Instant::now();
        ctx.control.cancel();
        assert!(handle.join().unwrap().is_ok());
        assert!(start.elapsed() < POLL * 10);
        assert!(port.sent(0).is_empty());
    }

    #[test]
    fn fatal_error_stops_the_slot() {
        let port = MockTransport::new("eth1", MockConfig::default());
        let ctx = context(RelayMode::Bidirectional, &port);
        let rx = spawn(Direction::Rx, ctx.clone()).unwrap();
        let tx = spawn(Direction::Tx, ctx.clone()).unwrap();
        port.set_faulted(true);

        let err = rx.join().unwrap().unwrap_err();
        assert_eq!(err.op, TransportOp::PollReadable);
        assert!(ctx.control.is_cancelled());
        // the transmit worker either failed on its own poll or saw the cancellation
        let _ = tx.join().unwrap();
    }
}
