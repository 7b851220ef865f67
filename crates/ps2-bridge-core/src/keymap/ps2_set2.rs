//! Browser keyCode → PS/2 scan code set 2 table.
//!
//! Browsers report `KeyboardEvent.keyCode` values: `48..=57` for the main-row
//! digits `0`–`9` and `96..=105` for the numeric keypad digits.  A PS/2
//! keyboard identifies the same keys with set-2 "make" codes, e.g. `0x16` for
//! `1` and `0x70` for keypad `0`.
//!
//! `KEY_TO_SCAN_TABLE` is a compile-time array of 256 entries indexed by
//! keyCode, so a lookup is a single bounds-free index.

use super::ScanCode;

/// The mapped keys as `(key_code, scan_code)` pairs.
///
/// This list is the source for the lookup table and must match the
/// firmware's table byte for byte.
pub const MAPPED_KEYS: &[(u8, u8)] = &[
    // Main digit row
    (48, 0x45),  // 0
    (49, 0x16),  // 1
    (50, 0x1E),  // 2
    (51, 0x26),  // 3
    (52, 0x25),  // 4
    (53, 0x2E),  // 5
    (54, 0x36),  // 6
    (55, 0x3D),  // 7
    (56, 0x3E),  // 8
    (57, 0x46),  // 9
    // Numeric keypad
    (96, 0x70),  // KP0
    (97, 0x69),  // KP1
    (98, 0x72),  // KP2
    (99, 0x7A),  // KP3
    (100, 0x6B), // KP4
    (101, 0x73), // KP5
    (102, 0x74), // KP6
    (103, 0x6C), // KP7
    // Deployed firmware value, decimal 75.  Set 2 KP8 is 0x75; changing it
    // here needs the same change in the firmware.
    (104, 0x4B), // KP8
    (105, 0x7D), // KP9
];

/// Translates a browser keyCode to a scan code.
///
/// # Panics
///
/// This function never panics; all u8 inputs are handled.
pub fn key_code_to_scan_code(key_code: u8) -> ScanCode {
    KEY_TO_SCAN_TABLE[key_code as usize]
}

/// Translates a scan code back to a browser keyCode.
///
/// Linear scan over the 20 mapped keys; only used off the hot path.
pub fn scan_code_to_key_code(scan_code: u8) -> Option<u8> {
    MAPPED_KEYS
        .iter()
        .find(|&&(_, code)| code == scan_code)
        .map(|&(key_code, _)| key_code)
}

const KEY_TO_SCAN_TABLE: [ScanCode; 256] = {
    let mut t = [ScanCode::Unknown; 256];
    let mut i = 0;
    while i < MAPPED_KEYS.len() {
        let (key_code, scan_code) = MAPPED_KEYS[i];
        t[key_code as usize] = ScanCode::Known(scan_code);
        i += 1;
    }
    t
};

// ── Tests ─────────────────────────────────────────────────────────────────────
