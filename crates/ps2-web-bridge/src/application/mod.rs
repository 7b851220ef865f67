//! Application layer for ps2-web-bridge.
//!
//! Knows *what* to do with a key frame, delegates *how* bytes reach the device
//! to the infrastructure layer through the [`FrameSink`] trait.
//!
//! # Responsibilities
//!
//! - Validating inbound payloads as key frames
//! - Producing the diagnostic dump line
//! - Choosing the outbound bytes for the configured forward mode
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or serial ports (that is infrastructure)
//! - Tokio task spawning
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod bridge_service;

pub use bridge_service::{
    dump_line, outbound_bytes, Delivery, FrameOutcome, FrameSink, KeyBridge, SinkError,
};
