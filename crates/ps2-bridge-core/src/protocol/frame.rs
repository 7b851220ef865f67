//! The 2-byte key frame exchanged between the browser, the bridge and the
//! keyboard-emulating firmware.
//!
//! Wire format:
//! ```text
//! [direction:1][key_code:1]
//! ```
//! No length prefix, no envelope.  The WebSocket message boundary delimits a
//! frame on the browser side; on the serial side the firmware reads fixed
//! 2-byte units, which is why a frame must be exactly [`FRAME_LEN`] bytes.

use std::fmt;

use thiserror::Error;

/// Size of a key frame on the wire, in bytes.
pub const FRAME_LEN: usize = 2;

/// Errors produced when an inbound payload is not a valid key frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The payload is shorter than a key frame.
    #[error("key frame too short: expected {FRAME_LEN} bytes, got {len}")]
    TooShort { len: usize },

    /// The payload is longer than a key frame.
    #[error("key frame too long: expected {FRAME_LEN} bytes, got {len}")]
    TooLong { len: usize },
}

/// Whether a key was pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Key pressed (direction byte `0`).
    Down,
    /// Key released (any nonzero direction byte).
    Up,
}

impl Direction {
    /// Interprets a raw direction byte: `0` is down, everything else is up.
    pub fn from_byte(byte: u8) -> Self {
        if byte > 0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// Label used in diagnostic output.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Down => "Down",
            Direction::Up => "Up",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single key transition as sent by the browser.
///
/// The raw direction byte is kept as received so the frame can be forwarded
/// byte-for-byte; [`KeyFrame::direction`] gives the interpreted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFrame {
    direction: u8,
    key_code: u8,
}

impl KeyFrame {
    /// Builds a frame from its two raw bytes.
    pub const fn new(direction: u8, key_code: u8) -> Self {
        Self {
            direction,
            key_code,
        }
    }

    /// Validates an inbound payload and turns it into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooShort`] for 0- or 1-byte payloads and
    /// [`FrameError::TooLong`] for anything longer than [`FRAME_LEN`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ps2_bridge_core::{Direction, KeyFrame};
    ///
    /// let frame = KeyFrame::parse(&[0x00, 49]).unwrap();
    /// assert_eq!(frame.direction(), Direction::Down);
    /// assert_eq!(frame.key_code(), 49);
    /// assert!(KeyFrame::parse(&[0x00]).is_err());
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        match payload {
            [direction, key_code] => Ok(Self::new(*direction, *key_code)),
            short if short.len() < FRAME_LEN => Err(FrameError::TooShort { len: short.len() }),
            long => Err(FrameError::TooLong { len: long.len() }),
        }
    }

    /// Interpreted key direction.
    pub fn direction(&self) -> Direction {
        Direction::from_byte(self.direction)
    }

    /// Direction byte exactly as received.
    pub fn raw_direction(&self) -> u8 {
        self.direction
    }

    /// Browser keyCode identifying the physical key.
    pub fn key_code(&self) -> u8 {
        self.key_code
    }

    /// The frame's wire bytes.
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        [self.direction, self.key_code]
    }
}

impl TryFrom<&[u8]> for KeyFrame {
    type Error = FrameError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        Self::parse(payload)
    }
}

impl From<[u8; FRAME_LEN]> for KeyFrame {
    fn from(bytes: [u8; FRAME_LEN]) -> Self {
        Self::new(bytes[0], bytes[1])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
