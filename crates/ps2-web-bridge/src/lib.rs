//! ps2-web-bridge library crate.
//!
//! Accepts browser WebSocket connections carrying 2-byte key frames and
//! forwards them over a serial link to a microcontroller that emulates a PS/2
//! keyboard.
//!
//! # Architecture
//!
//! ```text
//! Browser (binary key frames over WebSocket)
//!         ↓
//! [ps2-web-bridge]
//!   ├── domain/           BridgeConfig and friends
//!   ├── application/      KeyBridge: validate, dump, forward
//!   └── infrastructure/
//!         ├── ws_server/  Accept loop, upgrade policy, per-connection loops
//!         └── serial/     Serial port + single writer task
//!         ↓
//! Keyboard-emulator firmware (serial, raw 2-byte frames)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain` and `ps2-bridge-core` only.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite` and `tokio-serial`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: per-frame bridge logic.
pub mod application;

/// Infrastructure layer: WebSocket server and serial transport.
pub mod infrastructure;
