// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Control frames.
//!
//! A frame is 8 octets: the interface index followed by a command code, both signed 32 bit
//! little-endian integers. Codes 1 to 9 select a relay mode (only 1, 2 and 3 are defined), codes
//! from 10 up attach (any code but 10) or detach (10) the interface. Frames with a non-positive
//! index or code are ignored.

use std::fmt::Display;
use std::io::{self, Read, Write};

use interface_manager::{RelayMode, SlotIndex};

/// Size of a frame on the wire.
pub const FRAME_LEN: usize = 8;

/// Codes at or above this value carry an attach flag.
pub const ATTACH_BASE: i32 = 10;

/// A raw control frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: i32,
    pub code: i32,
}

impl Frame {
    #[must_use]
    pub fn new(index: i32, code: i32) -> Self {
        Self { index, code }
    }

    /// Frame setting the mode of an interface, starting it if needed.
    #[must_use]
    pub fn mode(index: i32, mode: RelayMode) -> Self {
        Self::new(index, mode.code())
    }

    /// Frame attaching or detaching an interface.
    #[must_use]
    pub fn attach(index: i32, attached: bool) -> Self {
        Self::new(index, ATTACH_BASE + i32::from(attached))
    }

    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut raw = [0u8; FRAME_LEN];
        raw[..4].copy_from_slice(&self.index.to_le_bytes());
        raw[4..].copy_from_slice(&self.code.to_le_bytes());
        raw
    }

    #[must_use]
    pub fn decode(raw: &[u8; FRAME_LEN]) -> Self {
        let [i0, i1, i2, i3, c0, c1, c2, c3] = *raw;
        Self {
            index: i32::from_le_bytes([i0, i1, i2, i3]),
            code: i32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}, {}}}", self.index, self.code)
    }
}

/// The meaning of a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    /// Non-positive index or code
    Ignore(Frame),
    /// Set the mode of an interface, starting it first if it never was
    SetMode { index: SlotIndex, mode: RelayMode },
    /// Codes 4 to 9
    Reserved { index: SlotIndex, code: i32 },
    SetAttached { index: SlotIndex, attached: bool },
}

impl From<Frame> for Command {
    fn from(frame: Frame) -> Self {
        if frame.index <= 0 || frame.code <= 0 {
            return Command::Ignore(frame);
        }
        let index = SlotIndex(frame.index.unsigned_abs());
        if frame.code >= ATTACH_BASE {
            return Command::SetAttached {
                index,
                attached: frame.code - ATTACH_BASE != 0,
            };
        }
        match RelayMode::try_from(frame.code) {
            Ok(mode) => Command::SetMode { index, mode },
            Err(code) => Command::Reserved { index, code },
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Ignore(frame) => write!(f, "ignore {frame}"),
            Command::SetMode { index, mode } => write!(f, "set slot {index} mode {mode}"),
            Command::Reserved { index, code } => write!(f, "reserved code {code} for slot {index}"),
            Command::SetAttached { index, attached } => {
                let verb = if *attached { "attach" } else { "detach" };
                write!(f, "{verb} slot {index}")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Truncated frame: connection closed after {got} of {FRAME_LEN} octets")]
    Truncated { got: usize },
    #[error("I/O error reading frame: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// The read timed out; the partial frame, if any, is kept and reading can resume.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, FrameError::Io(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut))
    }
}

/// Reads frames off a byte stream.
pub struct FrameReader<R> {
    reader: R,
    raw: [u8; FRAME_LEN],
    got: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            raw: [0; FRAME_LEN],
            got: 0,
        }
    }

    /// Read the next frame. Returns `Ok(None)` if the stream ended cleanly between frames.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        while self.got < FRAME_LEN {
            match self.reader.read(&mut self.raw[self.got..]) {
                Ok(0) if self.got == 0 => return Ok(None),
                Ok(0) => {
                    let got = self.got;
                    self.got = 0;
                    return Err(FrameError::Truncated { got });
                }
                Ok(n) => self.got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.got = 0;
        Ok(Some(Frame::decode(&self.raw)))
    }
}

/// Writes frames to a byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame. Returns the number of octets written.
    pub fn write_frame(&mut self, frame: Frame) -> io::Result<usize> {
        self.writer.write_all(&frame.encode())?;
        self.writer.flush()?;
        Ok(FRAME_LEN)
    }
}
