// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use driver::TransportOpener;
use interface_manager::{InterfaceManager, ManagerError, RelayMode, SlotIndex};

#[allow(unused)]
use tracing::{debug, error, info, warn};

use crate::Command;

/// The receiver of control commands.
pub trait CommandHandler: Send + Sync {
    fn ensure_started(&self, index: SlotIndex, mode: RelayMode) -> Result<(), ManagerError>;
    fn set_attached(&self, index: SlotIndex, attached: bool) -> Result<(), ManagerError>;
}

impl<O: TransportOpener> CommandHandler for InterfaceManager<O> {
    fn ensure_started(&self, index: SlotIndex, mode: RelayMode) -> Result<(), ManagerError> {
        InterfaceManager::ensure_started(self, index, mode)
    }
    fn set_attached(&self, index: SlotIndex, attached: bool) -> Result<(), ManagerError> {
        InterfaceManager::set_attached(self, index, attached)
    }
}

impl Command {
    /// Apply this command. Ignored and reserved commands leave the handler untouched.
    pub fn execute<H: CommandHandler + ?Sized>(&self, handler: &H) -> Result<(), ManagerError> {
        match *self {
            Command::Ignore(frame) => {
                debug!("Ignoring frame {frame}");
                Ok(())
            }
            Command::Reserved { index, code } => {
                info!(slot = index.as_u32(), "Reserved mode code {code}, nothing to do");
                Ok(())
            }
            Command::SetMode { index, mode } => handler.ensure_started(index, mode),
            Command::SetAttached { index, attached } => handler.set_attached(index, attached),
        }
    }
}
