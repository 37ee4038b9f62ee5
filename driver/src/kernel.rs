// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel ring transport.
//!
//! Interfaces are reached through an `AF_PACKET` socket bound to them. The kernel owns the
//! socket queues, so such a transport exposes a single receive and a single transmit ring,
//! syncing is a no-op and transmissions are never reported pending.

use std::collections::HashSet;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::sync::Arc;
use std::time::Duration;

use afpacket::sync::RawPacketStream;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::socket::{LinkAddr, MsgFlags, recvfrom, send};
use parking_lot::Mutex;

use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

use crate::{
    Readiness, RingId, RingTransport, TransportError, TransportOp, TransportOpenError,
    TransportOpener, WriteOutcome,
};

trace_target!("kernel-transport", LevelFilter::INFO, &["driver"]);

/// Largest frame read from or written to a kernel interface.
pub const KERNEL_MAX_FRAME: usize = 9100;

/// Number of frames we are willing to hand to the kernel per transmit burst.
const KERNEL_TX_SLOTS: usize = 256;

/// `sll_pkttype` of frames sent by this host.
const PACKET_OUTGOING: u8 = 4;

type InUse = Arc<Mutex<HashSet<String>>>;

/// Tell if the kernel knows an interface with the given name.
#[must_use]
pub fn interface_exists(name: &str) -> bool {
    nix::net::if_::if_nametoindex(name).is_ok()
}

/// Opens [`AfPacketTransport`]s, refusing to open the same interface twice.
#[derive(Default)]
pub struct AfPacketOpener {
    in_use: InUse,
}

impl AfPacketOpener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransportOpener for AfPacketOpener {
    type Transport = AfPacketTransport;

    fn open(&self, name: &str) -> Result<AfPacketTransport, TransportOpenError> {
        if !interface_exists(name) {
            return Err(TransportOpenError::NoSuchInterface(name.to_owned()));
        }
        if !self.in_use.lock().insert(name.to_owned()) {
            return Err(TransportOpenError::Busy(name.to_owned()));
        }
        AfPacketTransport::open(name, self.in_use.clone()).inspect_err(|e| {
            error!("Unable to open {name}: {e}");
            self.in_use.lock().remove(name);
        })
    }
}

pub struct AfPacketTransport {
    name: String,
    fd: OwnedFd,
    _stream: RawPacketStream,
    in_use: InUse,
}

impl AfPacketTransport {
    #[allow(unsafe_code)]
    fn open(name: &str, in_use: InUse) -> Result<Self, TransportOpenError> {
        let io_err = |source: io::Error| TransportOpenError::Io {
            name: name.to_owned(),
            source,
        };
        let mut stream = RawPacketStream::new().map_err(io_err)?;
        stream.bind(name).map_err(io_err)?;
        stream.set_non_blocking().map_err(io_err)?;

        // the stream keeps ownership of its descriptor; we poll and do i/o on a duplicate
        let bfd = unsafe { BorrowedFd::borrow_raw(stream.as_raw_fd()) };
        let fd = nix::unistd::dup(bfd).map_err(|e| io_err(io::Error::from(e)))?;
        debug!("Opened packet socket for interface '{name}'");
        Ok(Self {
            name: name.to_owned(),
            fd,
            _stream: stream,
            in_use,
        })
    }

    fn poll(
        &self,
        events: PollFlags,
        timeout: Duration,
        op: TransportOp,
    ) -> Result<Readiness, TransportError> {
        let mut fds = [PollFd::new(self.fd.as_fd(), events)];
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) | Err(Errno::EINTR) => Ok(Readiness::TimedOut),
            Ok(_) => {
                let revents = fds[0].revents().unwrap_or(PollFlags::empty());
                if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL) {
                    return Err(TransportError::new(&self.name, op, format!("{revents:?}")));
                }
                if revents.intersects(events) {
                    Ok(Readiness::Ready)
                } else {
                    Ok(Readiness::TimedOut)
                }
            }
            Err(e) => Err(TransportError::new(&self.name, op, e)),
        }
    }
}

impl Drop for AfPacketTransport {
    fn drop(&mut self) {
        self.in_use.lock().remove(&self.name);
        debug!("Closed packet socket for interface '{}'", self.name);
    }
}

impl RingTransport for AfPacketTransport {
    fn name(&self) -> &str {
        &self.name
    }
    fn rx_rings(&self) -> u16 {
        1
    }
    fn tx_rings(&self) -> u16 {
        1
    }
    fn max_frame_size(&self) -> usize {
        KERNEL_MAX_FRAME
    }

    fn poll_readable(&self, timeout: Duration) -> Result<Readiness, TransportError> {
        self.poll(PollFlags::POLLIN, timeout, TransportOp::PollReadable)
    }

    fn poll_writable(&self, timeout: Duration) -> Result<Readiness, TransportError> {
        self.poll(PollFlags::POLLOUT, timeout, TransportOp::PollWritable)
    }

    fn drain_ring(
        &self,
        _ring: RingId,
        limit: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, TransportError> {
        let mut raw = [0u8; KERNEL_MAX_FRAME];
        let mut count = 0;
        while count < limit {
            match recvfrom::<LinkAddr>(self.fd.as_raw_fd(), &mut raw) {
                Ok((0, _)) => break,
                Ok((len, addr)) => {
                    // our own transmissions echo back on the socket of the egress interface
                    if addr.is_some_and(|a| a.pkttype() == PACKET_OUTGOING) {
                        continue;
                    }
                    if len >= raw.len() {
                        warn!(
                            "Frame on {} may exceed {} octets, truncating",
                            self.name,
                            raw.len()
                        );
                    }
                    trace!("Received frame with {len} octets on {}", self.name);
                    sink(&raw[..len.min(raw.len())]);
                    count += 1;
                }
                Err(Errno::EAGAIN | Errno::EINTR) => break,
                Err(e) => return Err(TransportError::new(&self.name, TransportOp::Drain, e)),
            }
        }
        Ok(count)
    }

    fn tx_space(&self, _ring: RingId) -> Result<usize, TransportError> {
        Ok(KERNEL_TX_SLOTS)
    }

    fn write_ring(&self, _ring: RingId, payload: &[u8]) -> Result<WriteOutcome, TransportError> {
        match send(self.fd.as_raw_fd(), payload, MsgFlags::MSG_DONTWAIT) {
            Ok(_) => Ok(WriteOutcome::Written),
            Err(Errno::EAGAIN | Errno::ENOBUFS) => Ok(WriteOutcome::RingFull),
            Err(e @ (Errno::EMSGSIZE | Errno::EINVAL)) => {
                debug!("{} refused a frame of {} octets: {e}", self.name, payload.len());
                Ok(WriteOutcome::Rejected)
            }
            Err(e) => Err(TransportError::new(&self.name, TransportOp::Write, e)),
        }
    }

    fn sync_transmit(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn pending_transmit(&self, _ring: RingId) -> Result<bool, TransportError> {
        Ok(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loopback_exists() {
        assert!(interface_exists("lo"));
        assert!(!interface_exists("no-such-if0"));
    }

    #[test]
    fn open_unknown_interface_fails() {
        let opener = AfPacketOpener::new();
        match opener.open("no-such-if0") {
            Err(TransportOpenError::NoSuchInterface(name)) => assert_eq!(name, "no-such-if0"),
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("should not open"),
        }
        assert!(opener.in_use.lock().is_empty());
    }

    #[test]
    fn draining_an_idle_socket_returns() {
        let opener = AfPacketOpener::new();
        let port = opener.open("lo").unwrap();
        // a blocking socket would hang once the queued frames are consumed
        let drained = port.drain_ring(RingId(0), usize::MAX, &mut |_: &[u8]| {}).unwrap();
        assert!(drained < usize::MAX);
        port.close();
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let opener = AfPacketOpener::new();
        let port = opener.open("lo").unwrap();
        let outcome = port.write_ring(RingId(0), &[0u8; 70_000]).unwrap();
        assert_eq!(outcome, WriteOutcome::Rejected);
        assert_eq!(
            port.write_ring(RingId(0), &[0u8; 60]).unwrap(),
            WriteOutcome::Written
        );
        port.close();
        assert!(opener.in_use.lock().is_empty());
    }
}
