//! End-to-end tests for the WebSocket → serial path.
//!
//! Each test binds a real listener on `127.0.0.1:0`, connects with a
//! `tokio-tungstenite` client the way the browser page does, and observes the
//! serial side through the far end of an in-memory `tokio::io::duplex` pipe
//! that stands in for the device.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::ORIGIN, HeaderValue, StatusCode},
        protocol::frame::coding::CloseCode,
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};

use ps2_web_bridge::application::{FrameSink, KeyBridge};
use ps2_web_bridge::domain::{ForwardMode, OriginPolicy};
use ps2_web_bridge::infrastructure::{BridgeServer, SerialTransport};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP: Duration = Duration::from_secs(2);

struct Harness {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    server: JoinHandle<anyhow::Result<()>>,
}

async fn start(bridge: KeyBridge, policy: OriginPolicy) -> Harness {
    let server = BridgeServer::bind("127.0.0.1:0".parse().unwrap(), policy, Arc::new(bridge))
        .await
        .expect("bind must succeed");
    let addr = server.local_addr();
    let running = Arc::new(AtomicBool::new(true));
    let server = tokio::spawn(server.run(Arc::clone(&running)));
    Harness {
        addr,
        running,
        server,
    }
}

/// A forwarding bridge whose serial port is one end of a duplex pipe.
fn serial_bridge(mode: ForwardMode) -> (KeyBridge, SerialTransport, DuplexStream) {
    let (port, far_end) = tokio::io::duplex(1024);
    let transport = SerialTransport::from_writer(port, "duplex", Duration::from_secs(1), 16);
    let sink: Arc<dyn FrameSink> = Arc::new(transport.handle());
    (KeyBridge::new(Some(sink), true, mode), transport, far_end)
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("upgrade must succeed");
    ws
}

async fn read_wire(far_end: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(STEP, far_end.read_exact(&mut buf))
        .await
        .expect("serial bytes must arrive")
        .expect("read must succeed");
    buf
}

#[tokio::test]
async fn test_key_down_frame_is_forwarded_verbatim() {
    // Arrange
    let (bridge, _transport, mut far_end) = serial_bridge(ForwardMode::Raw);
    let harness = start(bridge, OriginPolicy::SameHost).await;
    let mut ws = connect(harness.addr, "/keys").await;

    // Act: key-down of "1", then key-up of keypad 0
    ws.send(Message::Binary(vec![0x00, 0x31])).await.unwrap();
    ws.send(Message::Binary(vec![0x01, 0x60])).await.unwrap();

    // Assert
    assert_eq!(read_wire(&mut far_end, 4).await, vec![0x00, 0x31, 0x01, 0x60]);
}

#[tokio::test]
async fn test_text_message_payload_is_treated_like_binary() {
    let (bridge, _transport, mut far_end) = serial_bridge(ForwardMode::Raw);
    let harness = start(bridge, OriginPolicy::SameHost).await;
    let mut ws = connect(harness.addr, "/keys").await;

    ws.send(Message::Text("\u{0}1".to_string())).await.unwrap();

    assert_eq!(read_wire(&mut far_end, 2).await, vec![0x00, b'1']);
}

#[tokio::test]
async fn test_translated_mode_writes_scan_code() {
    let (bridge, _transport, mut far_end) = serial_bridge(ForwardMode::Translated);
    let harness = start(bridge, OriginPolicy::SameHost).await;
    let mut ws = connect(harness.addr, "/keys").await;

    ws.send(Message::Binary(vec![0x00, 49])).await.unwrap();

    assert_eq!(read_wire(&mut far_end, 2).await, vec![0x00, 0x16]);
}

#[tokio::test]
async fn test_short_frame_closes_only_that_connection() {
    // Arrange: two clients on the same bridge
    let (bridge, _transport, mut far_end) = serial_bridge(ForwardMode::Raw);
    let harness = start(bridge, OriginPolicy::SameHost).await;
    let mut bad = connect(harness.addr, "/keys").await;
    let mut good = connect(harness.addr, "/keys").await;

    // Act: a 1-byte payload on the first connection
    bad.send(Message::Binary(vec![0x00])).await.unwrap();

    // Assert: the server closes it with a protocol-error close code
    let reply = timeout(STEP, bad.next()).await.expect("close must arrive");
    match reply {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.code, CloseCode::Protocol),
        other => panic!("expected a protocol close frame, got {other:?}"),
    }

    // Assert: the other connection still works and the truncated frame never
    // reached the wire (the first bytes seen are the good frame).
    good.send(Message::Binary(vec![0x00, 0x32])).await.unwrap();
    assert_eq!(read_wire(&mut far_end, 2).await, vec![0x00, 0x32]);
}

#[tokio::test]
async fn test_empty_payload_closes_connection() {
    let harness = start(KeyBridge::demo(false), OriginPolicy::SameHost).await;
    let mut ws = connect(harness.addr, "/keys").await;

    ws.send(Message::Binary(Vec::new())).await.unwrap();

    let reply = timeout(STEP, ws.next()).await.expect("close must arrive");
    assert!(matches!(reply, Some(Ok(Message::Close(Some(_))))));
}

#[tokio::test]
async fn test_demo_mode_keeps_session_alive() {
    // Arrange
    let harness = start(KeyBridge::demo(true), OriginPolicy::SameHost).await;
    let mut ws = connect(harness.addr, "/keys").await;

    // Act: several valid frames, then a ping
    for key in [48u8, 49, 96, 105, 200] {
        ws.send(Message::Binary(vec![0x00, key])).await.unwrap();
        ws.send(Message::Binary(vec![0x01, key])).await.unwrap();
    }
    ws.send(Message::Ping(vec![7])).await.unwrap();

    // Assert: nothing but the pong comes back
    let reply = timeout(STEP, ws.next()).await.expect("pong must arrive");
    assert!(matches!(reply, Some(Ok(Message::Pong(ref data))) if data == &[7]));
}

#[tokio::test]
async fn test_concurrent_clients_frames_stay_whole_and_ordered() {
    // Arrange
    let (bridge, _transport, mut far_end) = serial_bridge(ForwardMode::Raw);
    let harness = start(bridge, OriginPolicy::SameHost).await;
    let mut a = connect(harness.addr, "/keys").await;
    let mut b = connect(harness.addr, "/keys").await;

    // Act: client A sends key-downs, client B key-ups (direction 0x02)
    let send_a = async {
        for n in 0u8..20 {
            a.send(Message::Binary(vec![0x00, n])).await.unwrap();
        }
    };
    let send_b = async {
        for n in 0u8..20 {
            b.send(Message::Binary(vec![0x02, n])).await.unwrap();
        }
    };
    tokio::join!(send_a, send_b);
    let wire = read_wire(&mut far_end, 80).await;

    // Assert: every 2-byte chunk belongs to one client, in that client's order
    let (mut next_a, mut next_b) = (0u8, 0u8);
    for frame in wire.chunks(2) {
        match frame[0] {
            0x00 => {
                assert_eq!(frame[1], next_a);
                next_a += 1;
            }
            0x02 => {
                assert_eq!(frame[1], next_b);
                next_b += 1;
            }
            other => panic!("interleaved bytes on the wire: direction {other:#04x}"),
        }
    }
    assert_eq!((next_a, next_b), (20, 20));
}

#[tokio::test]
async fn test_echo_endpoint_returns_messages() {
    let harness = start(KeyBridge::demo(false), OriginPolicy::SameHost).await;
    let mut ws = connect(harness.addr, "/echo").await;

    ws.send(Message::Text("hello".to_string())).await.unwrap();
    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

    let first = timeout(STEP, ws.next()).await.unwrap().unwrap().unwrap();
    let second = timeout(STEP, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first, Message::Text("hello".to_string()));
    assert_eq!(second, Message::Binary(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_unknown_path_is_rejected_with_404() {
    let harness = start(KeyBridge::demo(false), OriginPolicy::SameHost).await;

    let result = connect_async(format!("ws://{}/static/app.js", harness.addr)).await;

    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
        other => panic!("expected HTTP 404, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_cross_origin_upgrade_is_rejected_by_default() {
    // Arrange
    let harness = start(KeyBridge::demo(false), OriginPolicy::SameHost).await;
    let mut request = format!("ws://{}/keys", harness.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert(ORIGIN, HeaderValue::from_static("http://evil.example"));

    // Act
    let result = connect_async(request).await;

    // Assert
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
        other => panic!("expected HTTP 403, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_same_origin_upgrade_is_accepted() {
    let harness = start(KeyBridge::demo(false), OriginPolicy::SameHost).await;
    let mut request = format!("ws://{}/keys", harness.addr)
        .into_client_request()
        .unwrap();
    let origin = HeaderValue::from_str(&format!("http://{}", harness.addr)).unwrap();
    request.headers_mut().insert(ORIGIN, origin);

    assert!(connect_async(request).await.is_ok());
}

#[tokio::test]
async fn test_allow_any_origin_accepts_cross_origin_upgrade() {
    let harness = start(KeyBridge::demo(false), OriginPolicy::AllowAny).await;
    let mut request = format!("ws://{}/keys", harness.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert(ORIGIN, HeaderValue::from_static("http://evil.example"));

    assert!(connect_async(request).await.is_ok());
}

#[tokio::test]
async fn test_server_stops_when_running_flag_cleared() {
    let harness = start(KeyBridge::demo(false), OriginPolicy::SameHost).await;

    harness.running.store(false, Ordering::Relaxed);

    let result = timeout(STEP, harness.server)
        .await
        .expect("accept loop must exit");
    assert!(result.unwrap().is_ok());
}

#[tokio::test]
async fn test_closing_transport_with_live_connection_does_not_break_session() {
    // Arrange: one connected client, then the serial port goes away
    let (bridge, transport, _far_end) = serial_bridge(ForwardMode::Raw);
    let harness = start(bridge, OriginPolicy::SameHost).await;
    let mut ws = connect(harness.addr, "/keys").await;
    transport.close().await.unwrap();

    // Act: frames now fail to queue, which must only be logged
    ws.send(Message::Binary(vec![0x00, 0x31])).await.unwrap();
    ws.send(Message::Ping(vec![1])).await.unwrap();

    // Assert: the session is still answering
    let reply = timeout(STEP, ws.next()).await.expect("pong must arrive");
    assert!(matches!(reply, Some(Ok(Message::Pong(_)))));
}
