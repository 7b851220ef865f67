//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built once in `main.rs` from CLI arguments (or from
//! [`BridgeConfig::default`] in tests) and passed down explicitly; nothing in
//! the bridge reads global state.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Interface name that runs the bridge without hardware.
pub const DEMO_INTERFACE: &str = "demo";

/// Errors produced while interpreting configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No serial interface was given.
    #[error("serial interface must not be empty (use a device path or \"{DEMO_INTERFACE}\")")]
    EmptyInterface,

    /// `--forward-mode` was not one of the known modes.
    #[error("unknown forward mode '{0}' (expected 'raw' or 'translated')")]
    UnknownForwardMode(String),

    /// The writer queue must hold at least one frame.
    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,
}

/// Where key frames are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialInterface {
    /// No hardware attached: frames are decoded and logged, never written.
    Demo,
    /// Path or name of the serial device, e.g. `/dev/ttyACM0` or `COM3`.
    Device(String),
}

impl SerialInterface {
    /// Interprets the `--interface` value.  The literal `demo` selects
    /// [`SerialInterface::Demo`]; anything else is a device name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyInterface`] for an empty string.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "" => Err(ConfigError::EmptyInterface),
            DEMO_INTERFACE => Ok(SerialInterface::Demo),
            device => Ok(SerialInterface::Device(device.to_string())),
        }
    }

    /// Returns `true` for [`SerialInterface::Demo`].
    pub fn is_demo(&self) -> bool {
        matches!(self, SerialInterface::Demo)
    }
}

impl fmt::Display for SerialInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerialInterface::Demo => f.write_str(DEMO_INTERFACE),
            SerialInterface::Device(name) => f.write_str(name),
        }
    }
}

/// What the bridge writes to the serial port for each valid frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardMode {
    /// Forward the browser's two bytes unchanged.  The firmware performs the
    /// keyCode → scan-code translation.
    #[default]
    Raw,
    /// Forward `[direction, scan_code]`, translated by the bridge.  Frames
    /// whose keyCode is not in the table are dropped.  Only for firmware that
    /// expects scan codes on the wire.
    Translated,
}

impl FromStr for ForwardMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(ForwardMode::Raw),
            "translated" => Ok(ForwardMode::Translated),
            _ => Err(ConfigError::UnknownForwardMode(s.to_string())),
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardMode::Raw => f.write_str("raw"),
            ForwardMode::Translated => f.write_str("translated"),
        }
    }
}

/// Which browser origins may open a WebSocket to the bridge.
///
/// Anyone who can open the socket can type on the attached machine, so the
/// permissive setting is an explicit opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginPolicy {
    /// Accept requests without an `Origin` header, and requests whose origin
    /// host matches the `Host` header.
    #[default]
    SameHost,
    /// Accept every origin.
    AllowAny,
}

/// Settings needed to open and drive the serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Device path or name.
    pub port: String,
    /// Line speed.  The link always uses 8 data bits, 1 stop bit, no parity.
    pub baud_rate: u32,
    /// Upper bound on a single frame write.
    pub write_timeout: Duration,
    /// Number of frames that may wait for the writer before senders block.
    pub queue_capacity: usize,
}

/// All runtime configuration for the key bridge.
///
/// # Example
///
/// ```rust
/// use ps2_web_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// assert!(cfg.serial_settings().is_none()); // demo by default
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,
    /// Serial device, or demo mode.
    pub interface: SerialInterface,
    /// Serial line speed.
    pub baud_rate: u32,
    /// Log one line per received key frame.
    pub dump: bool,
    /// Raw or translated forwarding.
    pub forward_mode: ForwardMode,
    /// Origin check applied during the WebSocket upgrade.
    pub origin_policy: OriginPolicy,
    /// Upper bound on a single serial write.
    pub write_timeout: Duration,
    /// Capacity of the queue feeding the serial writer task.
    pub queue_capacity: usize,
}

impl BridgeConfig {
    /// Returns `true` when no serial port should be opened.
    pub fn is_demo(&self) -> bool {
        self.interface.is_demo()
    }

    /// Serial port settings, or `None` in demo mode.
    pub fn serial_settings(&self) -> Option<SerialSettings> {
        match &self.interface {
            SerialInterface::Demo => None,
            SerialInterface::Device(port) => Some(SerialSettings {
                port: port.clone(),
                baud_rate: self.baud_rate,
                write_timeout: self.write_timeout,
                queue_capacity: self.queue_capacity,
            }),
        }
    }
}

impl Default for BridgeConfig {
    /// | Field          | Default          |
    /// |----------------|------------------|
    /// | bind_addr      | `127.0.0.1:8080` |
    /// | interface      | demo             |
    /// | baud_rate      | 9600             |
    /// | dump           | off              |
    /// | forward_mode   | raw              |
    /// | origin_policy  | same host        |
    /// | write_timeout  | 1 second         |
    /// | queue_capacity | 64               |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            interface: SerialInterface::Demo,
            baud_rate: 9600,
            dump: false,
            forward_mode: ForwardMode::Raw,
            origin_policy: OriginPolicy::SameHost,
            write_timeout: Duration::from_millis(1000),
            queue_capacity: 64,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
