//! Browser keyCode → PS/2 scan-code translation.
//!
//! # Firmware contract
//!
//! The bridge forwards the browser's raw `[direction, key_code]` bytes to the
//! microcontroller, and the firmware translates `key_code` into a PS/2 scan
//! code itself.  The table in [`ps2_set2`] is a *reference copy* of that
//! firmware mapping.  In the default forwarding mode the bridge uses it only to
//! print diagnostic lines, so a mismatch does not change what the hardware
//! does, it makes the log lie about it.
//!
//! Any edit to this table must ship together with the matching firmware
//! change.

pub mod ps2_set2;

use std::fmt;

/// Result of looking up a keyCode in the scan-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanCode {
    /// The key is mapped to this PS/2 set-2 make code.
    Known(u8),
    /// The key is outside the mapped set.
    Unknown,
}

impl ScanCode {
    /// Returns the scan code byte, or `None` for [`ScanCode::Unknown`].
    pub fn code(self) -> Option<u8> {
        match self {
            ScanCode::Known(code) => Some(code),
            ScanCode::Unknown => None,
        }
    }

    /// Returns `true` if the lookup produced a scan code.
    pub fn is_known(self) -> bool {
        matches!(self, ScanCode::Known(_))
    }
}

/// Two-digit upper-case hex for known codes, `??` for unknown ones.
impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanCode::Known(code) => write!(f, "{code:02X}"),
            ScanCode::Unknown => f.write_str("??"),
        }
    }
}

/// Entry point for scan-code lookups in both directions.
pub struct ScanCodeTable;

impl ScanCodeTable {
    /// Translates a browser keyCode into a PS/2 scan code.
    ///
    /// Total over all `u8` inputs: unmapped keyCodes yield
    /// [`ScanCode::Unknown`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ps2_bridge_core::{ScanCode, ScanCodeTable};
    ///
    /// assert_eq!(ScanCodeTable::decode(49), ScanCode::Known(0x16));
    /// assert_eq!(ScanCodeTable::decode(65), ScanCode::Unknown);
    /// ```
    pub fn decode(key_code: u8) -> ScanCode {
        ps2_set2::key_code_to_scan_code(key_code)
    }

    /// Translates a scan code back into the browser keyCode that produces it.
    ///
    /// Returns `None` if no mapped key uses `scan_code`.
    pub fn key_code_for(scan_code: u8) -> Option<u8> {
        ps2_set2::scan_code_to_key_code(scan_code)
    }

    /// Every `(key_code, scan_code)` pair in the table, in keyCode order.
    pub fn entries() -> impl Iterator<Item = (u8, u8)> {
        ps2_set2::MAPPED_KEYS.iter().copied()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
