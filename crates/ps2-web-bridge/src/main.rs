//! PS/2 key bridge: entry point.
//!
//! Accepts WebSocket connections from a browser page that captures key
//! presses and forwards each 2-byte key frame to a microcontroller over a
//! serial port.  The microcontroller replays the keys as a PS/2 keyboard.
//!
//! # Usage
//!
//! ```text
//! ps2-web-bridge -i <INTERFACE> [OPTIONS]
//!
//! Options:
//!   -i, --interface <PORT>      Serial device, or "demo" to run without hardware
//!   -a, --addr <ADDR>           Listen address [default: 127.0.0.1:8080]
//!   -b, --baud <RATE>           Serial baud rate [default: 9600]
//!   -d, --dump                  Log every key frame
//!       --forward-mode <MODE>   raw | translated [default: raw]
//!       --allow-any-origin      Accept WebSocket upgrades from any origin
//!       --write-timeout-ms <MS> Serial write bound [default: 1000]
//!       --queue-capacity <N>    Frames queued for the serial writer [default: 64]
//! ```
//!
//! Every option can also be set through a `PS2_BRIDGE_*` environment
//! variable; CLI args take precedence.  Log verbosity follows `RUST_LOG`.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ps2_web_bridge::application::{FrameSink, KeyBridge};
use ps2_web_bridge::domain::{
    BridgeConfig, ConfigError, ForwardMode, OriginPolicy, SerialInterface,
};
use ps2_web_bridge::infrastructure::{BridgeServer, SerialTransport};

/// How long shutdown waits for queued frames to reach the serial port.
const CLOSE_GRACE: Duration = Duration::from_secs(3);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Browser-to-PS/2 keyboard bridge.
#[derive(Debug, Parser)]
#[command(
    name = "ps2-web-bridge",
    about = "Forwards browser key events to a PS/2 keyboard emulator over serial",
    version
)]
struct Cli {
    /// Serial interface of the keyboard-emulator board, e.g. /dev/ttyACM0.
    ///
    /// The value `demo` runs the bridge without hardware: frames are decoded
    /// and logged but never written.
    #[arg(short = 'i', long, env = "PS2_BRIDGE_INTERFACE")]
    interface: String,

    /// Address the WebSocket listener binds to.
    #[arg(short = 'a', long, default_value = "127.0.0.1:8080", env = "PS2_BRIDGE_ADDR")]
    addr: String,

    /// Serial baud rate.
    #[arg(short = 'b', long, default_value_t = 9600, env = "PS2_BRIDGE_BAUD")]
    baud: u32,

    /// Log one line per key frame with its scan code, keyCode and direction.
    #[arg(short = 'd', long, env = "PS2_BRIDGE_DUMP")]
    dump: bool,

    /// What to write to the serial port: `raw` forwards the browser bytes
    /// unchanged (the firmware translates), `translated` sends the scan code.
    #[arg(long, default_value = "raw", env = "PS2_BRIDGE_FORWARD_MODE")]
    forward_mode: ForwardMode,

    /// Accept WebSocket upgrades from any origin.
    ///
    /// By default a browser page may only connect if it was served from the
    /// same host as the bridge.  With this flag any page the user visits can
    /// type on the attached machine.
    #[arg(long, env = "PS2_BRIDGE_ALLOW_ANY_ORIGIN")]
    allow_any_origin: bool,

    /// Upper bound on a single serial write, in milliseconds.
    #[arg(long, default_value_t = 1000, env = "PS2_BRIDGE_WRITE_TIMEOUT_MS")]
    write_timeout_ms: u64,

    /// Number of frames that may wait for the serial writer.
    #[arg(long, default_value_t = 64, env = "PS2_BRIDGE_QUEUE_CAPACITY")]
    queue_capacity: usize,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--addr` is not a socket address, `--interface` is
    /// empty, or `--queue-capacity` is 0.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let bind_addr: SocketAddr = self
            .addr
            .parse()
            .with_context(|| format!("invalid listen address: '{}'", self.addr))?;

        let interface = SerialInterface::parse(&self.interface)?;

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity.into());
        }

        Ok(BridgeConfig {
            bind_addr,
            interface,
            baud_rate: self.baud,
            dump: self.dump,
            forward_mode: self.forward_mode,
            origin_policy: if self.allow_any_origin {
                OriginPolicy::AllowAny
            } else {
                OriginPolicy::SameHost
            },
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            queue_capacity: self.queue_capacity,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Initialise `tracing` (level from `RUST_LOG`, default `info`).
/// 2. Parse CLI arguments into a [`BridgeConfig`].
/// 3. Open the serial port unless running in demo mode.  Failure aborts
///    startup before the listener is bound.
/// 4. Bind the listener and serve until Ctrl+C.
/// 5. Close the serial port.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` picks the level; absent or invalid falls back to `info`,
    // which is the level the per-frame dump lines are logged at.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    //
    // `Cli::parse()` exits with a usage message when `--interface` is missing
    // or a value does not parse; semantic checks happen in
    // `into_bridge_config` and come back as an error from `main`.
    let config = Cli::parse().into_bridge_config()?;

    info!(
        "PS/2 key bridge starting: addr={}, interface={}, forward_mode={}, dump={}",
        config.bind_addr, config.interface, config.forward_mode, config.dump
    );

    // ── Serial transport ──────────────────────────────────────────────────────
    //
    // Opened before the listener is bound: a bridge that cannot reach the
    // board must not accept keystrokes it would silently discard.
    let transport = match config.serial_settings() {
        Some(settings) => Some(
            SerialTransport::open(&settings)
                .with_context(|| format!("cannot start without serial port {}", settings.port))?,
        ),
        None => {
            info!("demo mode: key frames will not be sent to any device");
            None
        }
    };

    // Connection tasks only ever see the transport through this handle; the
    // port itself stays inside the writer task.
    let sink = transport
        .as_ref()
        .map(|t| Arc::new(t.handle()) as Arc<dyn FrameSink>);
    let bridge = Arc::new(KeyBridge::new(sink, config.dump, config.forward_mode));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    //
    // Ctrl+C clears `running`; the accept loop polls it every 200 ms.
    // `Relaxed` is enough since the flag guards no other data.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Serve ─────────────────────────────────────────────────────────────────
    //
    // A bind failure is held in `served` rather than returned with `?`, so
    // the transport below is still closed.
    let served = match BridgeServer::bind(config.bind_addr, config.origin_policy, bridge).await {
        Ok(server) => server.run(running).await,
        Err(e) => Err(e),
    };

    // The port is released on every path out of here, including bind failure.
    // A device stuck in the middle of a frame would hold the writer forever,
    // so the close is bounded; the runtime drops the writer (and the port)
    // on exit either way.
    if let Some(transport) = transport {
        match tokio::time::timeout(CLOSE_GRACE, transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("error while closing serial port: {e}"),
            Err(_) => warn!(
                "serial port did not drain within {}s; abandoning queued frames",
                CLOSE_GRACE.as_secs()
            ),
        }
    }

    served?;
    info!("PS/2 key bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
