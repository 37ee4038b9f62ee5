// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::Display;

#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Index of an interface slot, as used by the control protocol.
pub struct SlotIndex(pub u32);

impl SlotIndex {
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SlotIndex {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Direction in which an interface relays frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum RelayMode {
    /// Frames are received from the interface into the bus
    ReceiveOnly,
    /// Frames are taken from the bus and sent out the interface
    TransmitOnly,
    #[default]
    Bidirectional,
}

impl RelayMode {
    #[must_use]
    pub fn permits_rx(self) -> bool {
        matches!(self, RelayMode::ReceiveOnly | RelayMode::Bidirectional)
    }
    #[must_use]
    pub fn permits_tx(self) -> bool {
        matches!(self, RelayMode::TransmitOnly | RelayMode::Bidirectional)
    }
    /// The protocol code of this mode.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            RelayMode::ReceiveOnly => 1,
            RelayMode::TransmitOnly => 2,
            RelayMode::Bidirectional => 3,
        }
    }
}

impl TryFrom<i32> for RelayMode {
    type Error = i32;
    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(RelayMode::ReceiveOnly),
            2 => Ok(RelayMode::TransmitOnly),
            3 => Ok(RelayMode::Bidirectional),
            other => Err(other),
        }
    }
}

impl Display for RelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayMode::ReceiveOnly => write!(f, "rx-only"),
            RelayMode::TransmitOnly => write!(f, "tx-only"),
            RelayMode::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mode_codes() {
        for mode in [
            RelayMode::ReceiveOnly,
            RelayMode::TransmitOnly,
            RelayMode::Bidirectional,
        ] {
            assert_eq!(RelayMode::try_from(mode.code()), Ok(mode));
        }
        assert_eq!(RelayMode::try_from(0), Err(0));
        assert_eq!(RelayMode::try_from(4), Err(4));
    }

    #[test]
    fn directions() {
        assert!(RelayMode::ReceiveOnly.permits_rx());
        assert!(!RelayMode::ReceiveOnly.permits_tx());
        assert!(!RelayMode::TransmitOnly.permits_rx());
        assert!(RelayMode::TransmitOnly.permits_tx());
        assert!(RelayMode::Bidirectional.permits_rx() && RelayMode::Bidirectional.permits_tx());
    }
}
