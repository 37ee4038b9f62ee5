// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Relay management: the control channel through which an operator attaches, detaches and
//! reconfigures interfaces.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

mod frame;
mod handler;
mod listener;
mod tests;

pub use frame::{ATTACH_BASE, Command, FRAME_LEN, Frame, FrameError, FrameReader, FrameWriter};
pub use handler::CommandHandler;
pub use listener::{ControlListener, Disconnect, ListenerError, serve_client};

use tracectl::trace_target;
trace_target!("mgmt", LevelFilter::INFO, &["management"]);
