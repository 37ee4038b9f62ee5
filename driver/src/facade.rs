// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::Display;
use std::time::Duration;

#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Index of a receive or transmit ring within one interface.
pub struct RingId(pub u16);

impl RingId {
    /// The ring ids `0..count`.
    pub fn all(count: u16) -> impl Iterator<Item = RingId> {
        (0..count).map(RingId)
    }
    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl Display for RingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a bounded readiness wait.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Outcome of writing one frame into a transmit ring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    RingFull,
    /// The transport refused this frame (e.g. larger than the interface MTU). Only the frame
    /// is lost; the transport remains usable.
    Rejected,
}

/// The transport operation that failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportOp {
    PollReadable,
    PollWritable,
    Drain,
    Write,
    Sync,
    Pending,
}

impl Display for TransportOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportOp::PollReadable => write!(f, "poll-readable"),
            TransportOp::PollWritable => write!(f, "poll-writable"),
            TransportOp::Drain => write!(f, "drain"),
            TransportOp::Write => write!(f, "write"),
            TransportOp::Sync => write!(f, "sync"),
            TransportOp::Pending => write!(f, "pending"),
        }
    }
}

/// An interface could not be opened. The interface stays unattached.
#[derive(Debug, thiserror::Error)]
pub enum TransportOpenError {
    #[error("No such interface '{0}'")]
    NoSuchInterface(String),
    #[error("Interface '{0}' is already in use")]
    Busy(String),
    #[error("Failed to open interface '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// The hardware or driver reported an error in the middle of an operation.
///
/// This is fatal for the interface: its workers stop and the interface has to be attached again.
#[derive(Debug, thiserror::Error)]
#[error("Fatal transport error on '{name}' during {op}: {reason}")]
pub struct TransportError {
    pub name: String,
    pub op: TransportOp,
    pub reason: String,
}

impl TransportError {
    pub fn new(name: &str, op: TransportOp, reason: impl Display) -> Self {
        Self {
            name: name.to_owned(),
            op,
            reason: reason.to_string(),
        }
    }
}

/// Access to the receive and transmit rings of one opened interface.
///
/// A transport is shared by exactly two threads, the receive and the transmit worker of its
/// interface, which may call into it concurrently. Methods take `&self`; implementations provide
/// whatever interior synchronization they need.
pub trait RingTransport: Send + Sync + 'static {
    /// Name of the interface this transport was opened for.
    fn name(&self) -> &str;

    fn rx_rings(&self) -> u16;

    fn tx_rings(&self) -> u16;

    /// Largest frame the transport hands out or accepts.
    fn max_frame_size(&self) -> usize;

    /// Wait up to `timeout` for frames to become available on any receive ring.
    fn poll_readable(&self, timeout: Duration) -> Result<Readiness, TransportError>;

    /// Wait up to `timeout` for room in any transmit ring.
    fn poll_writable(&self, timeout: Duration) -> Result<Readiness, TransportError>;

    /// Hand up to `limit` available frames of receive ring `ring` to `sink`, in ring order,
    /// releasing each slot once `sink` returns. Returns the number of frames handed out.
    fn drain_ring(
        &self,
        ring: RingId,
        limit: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, TransportError>;

    /// Number of free slots in transmit ring `ring`.
    fn tx_space(&self, ring: RingId) -> Result<usize, TransportError>;

    /// Copy `payload` into the next free slot of transmit ring `ring` and advance the ring.
    fn write_ring(&self, ring: RingId, payload: &[u8]) -> Result<WriteOutcome, TransportError>;

    /// Ask the hardware to transmit what has been written so far.
    fn sync_transmit(&self) -> Result<(), TransportError>;

    /// Tell if transmit ring `ring` still holds frames the hardware has not sent.
    fn pending_transmit(&self, ring: RingId) -> Result<bool, TransportError>;

    /// Release the rings and the descriptor.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Something able to open a [`RingTransport`] given an interface name.
pub trait TransportOpener: Send + Sync + 'static {
    type Transport: RingTransport;

    fn open(&self, name: &str) -> Result<Self::Transport, TransportOpenError>;
}
