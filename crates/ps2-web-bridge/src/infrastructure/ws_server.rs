//! WebSocket server: accept loop, upgrade policy and per-connection tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Upgrading each connection to a WebSocket session, routing it by path
//!    and rejecting disallowed origins during the handshake.
//! 4. Running the session loop for the chosen endpoint:
//!    - `/keys`: every data message is a key frame handed to [`KeyBridge`].
//!      Nothing is sent back.
//!    - `/echo`: every data message is sent back unchanged (connectivity
//!      check).
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! Each connection runs in its own Tokio task inside a tracing span tagged
//! with a random connection id.  A connection ending, for whatever reason,
//! never affects the listener, the serial transport, or other connections.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::{header, StatusCode},
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::KeyBridge;
use crate::domain::OriginPolicy;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Routing ───────────────────────────────────────────────────────────────────

/// The WebSocket endpoints served by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Key frame stream forwarded to the keyboard emulator.
    Keys,
    /// Echo endpoint for connectivity checks.
    Echo,
}

impl Endpoint {
    /// Maps a request path to an endpoint.
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/keys" => Some(Endpoint::Keys),
            "/echo" => Some(Endpoint::Echo),
            _ => None,
        }
    }
}

/// Why an upgrade request was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpgradeRejection {
    /// No endpoint at this path.
    #[error("no WebSocket endpoint at '{0}'")]
    NotFound(String),

    /// The `Origin` header does not match the `Host` header.
    #[error("origin '{origin}' is not allowed for host '{host}'")]
    ForbiddenOrigin { origin: String, host: String },
}

impl UpgradeRejection {
    /// HTTP status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            UpgradeRejection::NotFound(_) => StatusCode::NOT_FOUND,
            UpgradeRejection::ForbiddenOrigin { .. } => StatusCode::FORBIDDEN,
        }
    }

    fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.to_string()));
        *response.status_mut() = self.status();
        response
    }
}

/// Decides whether an upgrade request may proceed and to which endpoint.
///
/// `origin` and `host` are the raw header values, if present.
pub fn route_upgrade(
    path: &str,
    origin: Option<&str>,
    host: Option<&str>,
    policy: OriginPolicy,
) -> Result<Endpoint, UpgradeRejection> {
    let endpoint =
        Endpoint::from_path(path).ok_or_else(|| UpgradeRejection::NotFound(path.to_string()))?;

    match (policy, origin) {
        (OriginPolicy::AllowAny, _) | (OriginPolicy::SameHost, None) => Ok(endpoint),
        (OriginPolicy::SameHost, Some(origin)) => {
            let host = host.unwrap_or("");
            if origin_matches_host(origin, host) {
                Ok(endpoint)
            } else {
                Err(UpgradeRejection::ForbiddenOrigin {
                    origin: origin.to_string(),
                    host: host.to_string(),
                })
            }
        }
    }
}

/// Compares the authority part of an `Origin` value (`scheme://host[:port]`)
/// with a `Host` header, ignoring ASCII case.
fn origin_matches_host(origin: &str, host: &str) -> bool {
    let Some((_, rest)) = origin.split_once("://") else {
        return false;
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    !host.is_empty() && authority.eq_ignore_ascii_case(host)
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A bound WebSocket listener ready to serve the bridge.
pub struct BridgeServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    origin_policy: OriginPolicy,
    bridge: Arc<KeyBridge>,
}

impl BridgeServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (port in use, no
    /// permission).
    pub async fn bind(
        addr: SocketAddr,
        origin_policy: OriginPolicy,
        bridge: Arc<KeyBridge>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read listener address")?;

        if origin_policy == OriginPolicy::AllowAny {
            warn!("origin check disabled: any web page can send keystrokes");
        }

        Ok(Self {
            listener,
            local_addr,
            origin_policy,
            bridge,
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `running` is set to `false`.
    ///
    /// Connection tasks that are still running when the loop exits are left
    /// to finish on their own.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!(
            "key bridge listening on ws://{}/keys ({})",
            self.local_addr,
            if self.bridge.is_demo() {
                "demo mode"
            } else {
                "forwarding to serial"
            }
        );

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // A short timeout on `accept()` lets the loop notice the `running`
            // flag even when no browser is connecting.
            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    // Every log line from this connection's task carries the
                    // span's id and peer, so interleaved sessions can be told
                    // apart.
                    let span = info_span!("conn", id = %Uuid::new_v4(), peer = %peer_addr);
                    let bridge = Arc::clone(&self.bridge);
                    let policy = self.origin_policy;
                    tokio::spawn(handle_connection(stream, bridge, policy).instrument(span));
                }
                Ok(Err(e)) => {
                    // Transient (e.g. out of file descriptors); keep serving.
                    error!("accept error: {e}");
                }
                Err(_) => {
                    // No connection in the last poll interval; re-check the flag.
                }
            }
        }

        Ok(())
    }
}

// ── Per-connection handling ───────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, bridge: Arc<KeyBridge>, policy: OriginPolicy) {
    debug!("new TCP connection");
    match run_connection(stream, bridge, policy).await {
        Ok(()) => info!("connection closed"),
        Err(e) => warn!("connection closed with error: {e:#}"),
    }
}

/// Performs the upgrade handshake and runs the selected endpoint's loop.
///
/// # Errors
///
/// Returns an error if the handshake fails or is rejected.
pub async fn run_connection<S>(
    stream: S,
    bridge: Arc<KeyBridge>,
    policy: OriginPolicy,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // ── Step 1: Handshake with routing ────────────────────────────────────────
    //
    // `accept_hdr_async` hands the parsed HTTP Upgrade request to the callback
    // before the "101 Switching Protocols" response goes out.  Plain
    // `accept_async` would upgrade any path from any origin; here the
    // callback picks the endpoint from the path and can still answer 404 or
    // 403 instead of upgrading.  The chosen endpoint is written back through
    // `endpoint` since the callback cannot return it.
    let mut endpoint = None;
    let ws = accept_hdr_async(stream, |req: &Request, response: Response| {
        let header_str = |name: header::HeaderName| {
            req.headers()
                .get(name)
                .map(|v: &header::HeaderValue| v.to_str().unwrap_or(""))
        };
        match route_upgrade(
            req.uri().path(),
            header_str(header::ORIGIN),
            header_str(header::HOST),
            policy,
        ) {
            Ok(selected) => {
                endpoint = Some(selected);
                Ok(response)
            }
            Err(rejection) => {
                warn!("upgrade rejected: {rejection}");
                Err(rejection.into_response())
            }
        }
    })
    .await
    .context("WebSocket handshake failed")?;

    // ── Step 2: Run the endpoint's loop until the client goes away ────────────
    match endpoint {
        Some(Endpoint::Keys) => {
            info!("key session established");
            run_key_session(ws, &bridge).await;
        }
        Some(Endpoint::Echo) => {
            info!("echo session established");
            run_echo_session(ws).await;
        }
        None => anyhow::bail!("handshake completed without an endpoint"),
    }
    Ok(())
}

/// Reads the next data payload, or `None` when the session is over.
async fn next_payload<S>(ws: &mut WebSocketStream<S>) -> Option<WsMessage>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let msg = match ws.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("WebSocket closed");
                return None;
            }
            Some(Err(e)) => {
                warn!("WebSocket read error: {e}");
                return None;
            }
            None => {
                debug!("WebSocket stream ended");
                return None;
            }
        };

        match msg {
            WsMessage::Binary(_) | WsMessage::Text(_) => return Some(msg),
            WsMessage::Close(_) => {
                debug!("WebSocket Close frame received");
                return None;
            }
            // tokio-tungstenite answers pings itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }
}

/// Key frame loop: validate, dump and forward every payload.
///
/// A payload that is not exactly one key frame closes the connection with
/// close code 1002.  Serial write problems are handled by the bridge and
/// never end the loop.
async fn run_key_session<S>(mut ws: WebSocketStream<S>, bridge: &KeyBridge)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = next_payload(&mut ws).await {
        // Text and Binary messages carry the frame the same way; only the
        // bytes matter.
        let payload = msg.into_data();
        if let Err(e) = bridge.handle_payload(&payload).await {
            // The firmware reads fixed 2-byte frames, so a client that sends
            // anything else cannot be resynchronised.  Drop it with 1002 and
            // leave every other connection alone.
            warn!("protocol violation, closing: {e}");
            let frame = CloseFrame {
                code: CloseCode::Protocol,
                reason: e.to_string().into(),
            };
            // Best effort: the client may already be gone.
            if let Err(e) = ws.close(Some(frame)).await {
                debug!("close handshake failed: {e}");
            }
            return;
        }
    }
}

/// Echo loop: every data message goes back unchanged.
async fn run_echo_session<S>(mut ws: WebSocketStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = next_payload(&mut ws).await {
        debug!("echo: {} bytes", msg.len());
        // A failed echo is only logged; the next read decides whether the
        // session is still alive.
        if let Err(e) = ws.send(msg).await {
            warn!("echo write failed: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
