//! Serial transport to the keyboard-emulator board.
//!
//! The port is opened once at startup and moved into a single writer task.
//! Connection tasks never touch the port: they push frames into a bounded
//! queue through a cloneable [`SerialHandle`], and the writer drains the queue
//! one frame at a time.  Every frame therefore reaches the wire as two
//! contiguous bytes, no matter how many browsers are connected.
//!
//! ```text
//! conn task ─┐
//! conn task ─┼─▶ mpsc (bounded) ─▶ writer task ─▶ serial port
//! conn task ─┘
//! ```
//!
//! # Lifecycle
//!
//! `Unopened → Open → Closed`.  [`SerialTransport::open`] opens the port
//! (8 data bits, 1 stop bit, no parity, no flow control).  [`SerialTransport::close`]
//! flushes frames that are already queued, shuts the port down and waits for
//! the writer to exit.  Dropping the transport without calling `close` also
//! stops the writer, which drops the port.
//!
//! The bridge never reads from the port, so there is no read-side
//! configuration (minimum read size, read timeout).

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, info, warn};

use ps2_bridge_core::FRAME_LEN;

use crate::application::{FrameSink, SinkError};
use crate::domain::SerialSettings;

/// Errors from the serial transport lifecycle.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device could not be opened (missing, busy, no permission, ...).
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// The device was opened but exclusive access could not be obtained.
    #[error("failed to get exclusive access to serial port {port}: {source}")]
    Exclusive {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// The writer task panicked or was cancelled.
    #[error("serial writer task failed: {0}")]
    Writer(#[from] JoinError),
}

/// Exclusively owned serial link, driven by one writer task.
pub struct SerialTransport {
    port_name: String,
    tx: mpsc::Sender<[u8; FRAME_LEN]>,
    stop: oneshot::Sender<()>,
    writer: JoinHandle<()>,
}

impl SerialTransport {
    /// Opens the serial device described by `settings` and starts the writer.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] if the device cannot be opened and
    /// [`TransportError::Exclusive`] if another process may share it.
    pub fn open(settings: &SerialSettings) -> Result<Self, TransportError> {
        let port = tokio_serial::new(settings.port.as_str(), settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|source| TransportError::Open {
                port: settings.port.clone(),
                source,
            })?;

        // TIOCEXCL: a second open() of the device fails while we hold it.
        #[cfg(unix)]
        let port = {
            let mut port = port;
            port.set_exclusive(true)
                .map_err(|source| TransportError::Exclusive {
                    port: settings.port.clone(),
                    source,
                })?;
            port
        };

        info!(
            "opened serial port {} at {} baud (8N1)",
            settings.port, settings.baud_rate
        );

        Ok(Self::from_writer(
            port,
            settings.port.clone(),
            settings.write_timeout,
            settings.queue_capacity,
        ))
    }

    /// Starts a writer task over any async byte sink.
    ///
    /// Used by [`SerialTransport::open`] and by tests, which pass an in-memory
    /// stream instead of a device.  A `queue_capacity` of 0 is treated as 1.
    pub fn from_writer<W>(
        port: W,
        port_name: impl Into<String>,
        write_timeout: Duration,
        queue_capacity: usize,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let port_name = port_name.into();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (stop, stop_rx) = oneshot::channel();
        let writer = tokio::spawn(run_writer(
            port,
            port_name.clone(),
            rx,
            stop_rx,
            write_timeout,
        ));

        Self {
            port_name,
            tx,
            stop,
            writer,
        }
    }

    /// Name of the underlying device.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Returns a cloneable handle that connection tasks use to queue frames.
    pub fn handle(&self) -> SerialHandle {
        SerialHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stops accepting frames, writes the ones already queued, shuts the port
    /// down and waits for the writer task to exit.
    ///
    /// Handles held by still-running connections start failing with
    /// [`SinkError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Writer`] if the writer task panicked.
    pub async fn close(self) -> Result<(), TransportError> {
        // The writer may already be gone; either way it is told to stop.
        let _ = self.stop.send(());
        drop(self.tx);
        self.writer.await?;
        Ok(())
    }
}

/// Cloneable sender side of the writer queue.
#[derive(Debug, Clone)]
pub struct SerialHandle {
    tx: mpsc::Sender<[u8; FRAME_LEN]>,
}

#[async_trait]
impl FrameSink for SerialHandle {
    /// Queues the frame, waiting while the queue is full.
    async fn send_frame(&self, bytes: [u8; FRAME_LEN]) -> Result<(), SinkError> {
        self.tx.send(bytes).await.map_err(|_| SinkError::Closed)
    }
}

// ── Writer task ───────────────────────────────────────────────────────────────

async fn run_writer<W>(
    mut port: W,
    port_name: String,
    mut rx: mpsc::Receiver<[u8; FRAME_LEN]>,
    mut stop: oneshot::Receiver<()>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            biased;

            // Fires on close() and when the transport is dropped.
            _ = &mut stop => {
                rx.close();
                while let Some(bytes) = rx.recv().await {
                    write_frame(&mut port, &bytes, write_timeout, &port_name).await;
                }
                break;
            }

            next = rx.recv() => match next {
                Some(bytes) => write_frame(&mut port, &bytes, write_timeout, &port_name).await,
                None => break,
            },
        }
    }

    if let Err(e) = port.shutdown().await {
        debug!("serial port {port_name}: shutdown failed: {e}");
    }
    info!("serial port {port_name} closed");
}

/// Writes one frame; failures are logged and not retried.
///
/// The timeout only decides whether a frame is dropped.  Once the port has
/// taken part of a frame, the rest is written before anything else, however
/// long that takes: the firmware reads fixed 2-byte frames, and a lone byte
/// would shift every later frame by one.
async fn write_frame<W>(port: &mut W, bytes: &[u8; FRAME_LEN], limit: Duration, port_name: &str)
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    let first_try = timeout(limit, write_from(port, bytes, &mut written)).await;

    match first_try {
        Ok(Ok(())) => {
            debug!("serial port {port_name}: wrote {bytes:02X?}");
            return;
        }
        Ok(Err(e)) if written == 0 => {
            warn!("serial port {port_name}: write of {bytes:02X?} failed: {e}");
            return;
        }
        Err(_) if written == 0 => {
            warn!(
                "serial port {port_name}: write of {bytes:02X?} timed out after {}ms, frame dropped",
                limit.as_millis()
            );
            return;
        }
        Ok(Err(e)) => warn!(
            "serial port {port_name}: write of {bytes:02X?} failed after {written} byte(s): {e}; completing frame"
        ),
        Err(_) => warn!(
            "serial port {port_name}: write of {bytes:02X?} stalled after {written} byte(s); completing frame"
        ),
    }

    match write_from(port, bytes, &mut written).await {
        Ok(()) => debug!("serial port {port_name}: completed {bytes:02X?}"),
        Err(e) => warn!(
            "serial port {port_name}: could not complete {bytes:02X?} ({written} of {FRAME_LEN} bytes sent): {e}"
        ),
    }
}

/// Writes `bytes[*written..]` and flushes, advancing `written` as the port
/// accepts bytes.
///
/// Cancel safe: `written` always counts the bytes the port has taken, so a
/// cancelled call can be resumed by calling again with the same counter.
async fn write_from<W>(port: &mut W, bytes: &[u8], written: &mut usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while *written < bytes.len() {
        let n = port.write(&bytes[*written..]).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        *written += n;
    }
    port.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
