//! # ps2-bridge-core
//!
//! Shared library for the PS/2 key bridge containing the key frame wire
//! format and the browser-keyCode → PS/2 scan-code table.
//!
//! It has zero dependencies on OS APIs, async runtimes, or sockets, so the
//! same types can be used by the bridge service, by test harnesses, and by
//! tooling that checks the table against the firmware.
//!
//! # Overview
//!
//! A browser captures key-down/key-up events and sends each one as a 2-byte
//! [`KeyFrame`]:
//!
//! ```text
//! [direction: u8][key_code: u8]
//!  0 = down          browser KeyboardEvent.keyCode
//!  >0 = up
//! ```
//!
//! The bridge forwards those two bytes unchanged over a serial link to a
//! microcontroller that replays them as a real PS/2 keyboard.
//!
//! - **`protocol`** – Validation of inbound payloads into [`KeyFrame`] values.
//! - **`keymap`** – The keyCode → scan-code table used for diagnostics.  The
//!   firmware applies the same table to the raw bytes, so the two copies must
//!   stay identical.

pub mod keymap;
pub mod protocol;

pub use keymap::{ScanCode, ScanCodeTable};
pub use protocol::frame::{Direction, FrameError, KeyFrame, FRAME_LEN};
