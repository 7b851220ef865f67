//! Domain layer for ps2-web-bridge.
//!
//! Pure configuration types with no dependencies on I/O, networking, or
//! external frameworks.  `main.rs` populates them from the command line; the
//! application and infrastructure layers only read them.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, serial port or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;

pub use config::{
    BridgeConfig, ConfigError, ForwardMode, OriginPolicy, SerialInterface, SerialSettings,
    DEMO_INTERFACE,
};
