//! Per-frame bridge logic.
//!
//! [`KeyBridge`] decides what happens to one inbound WebSocket payload:
//! validate it as a [`KeyFrame`], optionally log a decoded line, and hand the
//! bytes to the [`FrameSink`] unless the bridge runs in demo mode.
//!
//! The sink is a trait so the WebSocket loop can be tested without a serial
//! port; the production implementation is
//! [`crate::infrastructure::serial::SerialHandle`].
//!
//! ```text
//! payload ──parse──▶ KeyFrame ──dump?──▶ log line
//!                        │
//!                        └──demo?──no──▶ FrameSink::send_frame
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use ps2_bridge_core::{FrameError, KeyFrame, ScanCode, ScanCodeTable, FRAME_LEN};

use crate::domain::ForwardMode;

// ── Sink seam ─────────────────────────────────────────────────────────────────

/// Errors reported by a [`FrameSink`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The writer behind the sink has shut down.
    #[error("serial writer is no longer running")]
    Closed,
}

/// Destination for frames that passed validation.
///
/// Infrastructure implementations feed the serial writer task; test
/// implementations record calls.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Delivers one frame's bytes.  Implementations must keep the bytes of a
    /// frame contiguous with respect to other callers.
    async fn send_frame(&self, bytes: [u8; FRAME_LEN]) -> Result<(), SinkError>;
}

// ── Outcome types ─────────────────────────────────────────────────────────────

/// What happened to a valid frame after it was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the sink as these bytes.
    Forwarded([u8; FRAME_LEN]),
    /// Demo mode: the sink was not called.
    Demo,
    /// Translated mode and the keyCode has no scan code: nothing sent.
    Unmapped,
    /// The sink rejected the frame.  The connection keeps going.
    SinkFailed,
}

/// Result of handling one valid frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    /// The decoded frame.
    pub frame: KeyFrame,
    /// The diagnostic line that was logged, when dumping is enabled.
    pub dump_line: Option<String>,
    /// Delivery result.
    pub delivery: Delivery,
}

// ── KeyBridge ─────────────────────────────────────────────────────────────────

/// Shared, immutable bridge state used by every connection task.
pub struct KeyBridge {
    sink: Option<Arc<dyn FrameSink>>,
    dump: bool,
    forward_mode: ForwardMode,
}

impl KeyBridge {
    /// Creates a bridge that forwards to `sink`.  Passing `None` puts the
    /// bridge in demo mode.
    pub fn new(sink: Option<Arc<dyn FrameSink>>, dump: bool, forward_mode: ForwardMode) -> Self {
        Self {
            sink,
            dump,
            forward_mode,
        }
    }

    /// Creates a demo-mode bridge: frames are decoded and optionally logged
    /// but never written.
    pub fn demo(dump: bool) -> Self {
        Self::new(None, dump, ForwardMode::Raw)
    }

    /// Returns `true` when there is no sink.
    pub fn is_demo(&self) -> bool {
        self.sink.is_none()
    }

    /// Returns `true` when every valid frame is logged.
    pub fn dump_enabled(&self) -> bool {
        self.dump
    }

    /// Handles one inbound payload.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if `payload` is not exactly one key frame.  The
    /// caller must close the connection; nothing has been forwarded.  Sink
    /// failures are *not* errors: they are logged and reported as
    /// [`Delivery::SinkFailed`].
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<FrameOutcome, FrameError> {
        let frame = KeyFrame::parse(payload)?;

        let dump_line = if self.dump {
            let line = dump_line(&frame);
            info!("{line}");
            Some(line)
        } else {
            None
        };

        let delivery = match &self.sink {
            None => Delivery::Demo,
            Some(sink) => match outbound_bytes(&frame, self.forward_mode) {
                None => {
                    warn!(
                        "dropping keyCode {} in translated mode: no scan code",
                        frame.key_code()
                    );
                    Delivery::Unmapped
                }
                Some(bytes) => match sink.send_frame(bytes).await {
                    Ok(()) => Delivery::Forwarded(bytes),
                    Err(e) => {
                        warn!("serial write failed: {e}");
                        Delivery::SinkFailed
                    }
                },
            },
        };

        Ok(FrameOutcome {
            frame,
            dump_line,
            delivery,
        })
    }
}

// ── Pure helpers ──────────────────────────────────────────────────────────────

/// Formats the diagnostic line for a frame:
/// `Received: <scan code hex> <keyCode decimal> <Up|Down>`.
///
/// Unmapped keys print `??` in place of the scan code.
pub fn dump_line(frame: &KeyFrame) -> String {
    format!(
        "Received: {} {} {}",
        ScanCodeTable::decode(frame.key_code()),
        frame.key_code(),
        frame.direction()
    )
}

/// Bytes written to the serial port for `frame` under `mode`.
///
/// Returns `None` only in translated mode for keys without a scan code.
pub fn outbound_bytes(frame: &KeyFrame, mode: ForwardMode) -> Option<[u8; FRAME_LEN]> {
    match mode {
        ForwardMode::Raw => Some(frame.to_bytes()),
        ForwardMode::Translated => match ScanCodeTable::decode(frame.key_code()) {
            ScanCode::Known(scan) => Some([frame.raw_direction(), scan]),
            ScanCode::Unknown => None,
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
