// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ring transports.
//!
//! A ring transport gives access to the receive and transmit rings of one network interface. The
//! relay only ever talks to interfaces through the [`RingTransport`] trait: workers poll it for
//! readiness, drain frames out of its receive rings and write frames into its transmit rings.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

mod facade;
pub mod kernel;
#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use facade::{
    Readiness, RingId, RingTransport, TransportError, TransportOp, TransportOpenError,
    TransportOpener, WriteOutcome,
};
