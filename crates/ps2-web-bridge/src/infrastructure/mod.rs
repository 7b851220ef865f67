//! Infrastructure layer for ps2-web-bridge.
//!
//! Handles all I/O: the serial port to the keyboard emulator and the
//! WebSocket listener for browsers.
//!
//! # Responsibilities
//!
//! - Opening the serial port and owning it in a single writer task
//! - Binding the TCP listener and performing the WebSocket upgrade
//! - Enforcing the endpoint routing and origin policy during the upgrade
//! - Spawning one Tokio task per connection
//! - Stopping the accept loop on shutdown

pub mod serial;
pub mod ws_server;

pub use serial::{SerialHandle, SerialTransport, TransportError};
pub use ws_server::{BridgeServer, Endpoint, UpgradeRejection};
