// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::{Debug, Display};

/// An owned copy of one frame.
///
/// A [`PacketBuffer`] is built by a receive worker from a ring slot, moved into the
/// [`crate::PacketQueue`] and finally moved out by a transmit worker, which drops it once the
/// payload has been copied into a transmit slot. It is never shared.
#[derive(Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    data: Box<[u8]>,
}

impl PacketBuffer {
    /// Copy a frame into a new buffer sized to it.
    #[must_use]
    pub fn copy_from(frame: &[u8]) -> Self {
        Self {
            data: Box::from(frame),
        }
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(value: Vec<u8>) -> Self {
        Self {
            data: value.into_boxed_slice(),
        }
    }
}

impl Debug for PacketBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Display for PacketBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} octets:", self.data.len())?;
        for byte in self.data.iter().take(16) {
            write!(f, " {byte:02x}")?;
        }
        if self.data.len() > 16 {
            write!(f, " ..")?;
        }
        Ok(())
    }
}
