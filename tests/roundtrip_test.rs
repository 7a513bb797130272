//! End-to-end tests against a live server on an ephemeral port

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use ws_rtt::{
    api::AppState,
    client,
    config::Config,
    heartbeat::{HeartbeatConfig, IDLE_TIMEOUT_REASON},
    log_sink::{LogSink, LogSinkConfig},
    server,
};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server(heartbeat: HeartbeatConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(
        listener,
        AppState::new(heartbeat),
        std::future::pending(),
    ));
    addr
}

async fn open(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/echo", addr)).await.unwrap();
    socket
}

async fn next_text(socket: &mut Socket) -> String {
    loop {
        let frame = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no reply within 5s")
            .expect("connection ended")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return text;
        }
    }
}

#[tokio::test]
async fn test_echo_preserves_timestamp_and_id() {
    let addr = spawn_server(HeartbeatConfig::default()).await;
    let mut socket = open(addr).await;

    for raw in [
        r#"{"timestamp":"2024-05-01T10:00:00.123456789Z","content":"abcdef","message_id":"7205759403792793600"}"#,
        r#"{"timestamp":"2024-05-01T10:00:00.1234Z","content":"abcdef","message_id":"7205759403792793601"}"#,
        r#"{"timestamp":"2024-05-01T12:00:00.5+02:00","content":"abcdef","message_id":"7205759403792793602"}"#,
    ] {
        socket.send(WsMessage::Text(raw.to_string())).await.unwrap();
        assert_eq!(next_text(&mut socket).await, raw);
    }
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let addr = spawn_server(HeartbeatConfig::default()).await;
    let mut socket = open(addr).await;

    socket
        .send(WsMessage::Text("definitely not json".to_string()))
        .await
        .unwrap();
    let raw = r#"{"timestamp":"2024-05-01T10:00:00Z","content":"after","message_id":"1"}"#;
    socket.send(WsMessage::Text(raw.to_string())).await.unwrap();

    assert_eq!(next_text(&mut socket).await, raw);
}

#[tokio::test]
async fn test_ping_over_http() {
    let addr = spawn_server(HeartbeatConfig::default()).await;

    let response = reqwest::get(format!("http://{}/ping", addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn test_silent_client_is_closed_with_idle_timeout() {
    let addr = spawn_server(HeartbeatConfig {
        ping_period: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(200),
    })
    .await;
    let mut socket = open(addr).await;

    // Not reading means never answering a ping.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let close = timeout(Duration::from_secs(5), async {
        while let Some(frame) = socket.next().await {
            if let Ok(WsMessage::Close(frame)) = frame {
                return frame;
            }
        }
        None
    })
    .await
    .expect("server did not close the connection");

    let close = close.expect("close frame without payload");
    assert_eq!(close.code, CloseCode::Normal);
    assert_eq!(close.reason, IDLE_TIMEOUT_REASON);
}

#[tokio::test]
async fn test_responsive_client_stays_connected() {
    let addr = spawn_server(HeartbeatConfig {
        ping_period: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(300),
    })
    .await;
    let mut socket = open(addr).await;

    // Reading lets the client answer every ping.
    let mut pings = 0;
    let watch = timeout(Duration::from_secs(1), async {
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(WsMessage::Ping(_)) => pings += 1,
                Ok(WsMessage::Close(frame)) => return Some(frame),
                _ => {}
            }
        }
        None
    })
    .await;

    assert!(watch.is_err(), "connection ended early: {:?}", watch);
    assert!(pings >= 2, "only {} pings seen", pings);

    let raw = r#"{"timestamp":"2024-05-01T10:00:00Z","content":"still here","message_id":"2"}"#;
    socket.send(WsMessage::Text(raw.to_string())).await.unwrap();
    assert_eq!(next_text(&mut socket).await, raw);
}

#[tokio::test]
async fn test_client_session_collects_stats() {
    let addr = spawn_server(HeartbeatConfig::default()).await;
    let config = Config {
        addr: addr.to_string(),
        interval_ms: 10,
        payload_size: 16,
        node_id: Some(3),
        ..Config::default()
    };
    let log_sink = LogSink::new(io::sink(), LogSinkConfig::default());

    let report = assert_ok!(
        client::run_until(
            &config,
            &log_sink,
            tokio::time::sleep(Duration::from_millis(300)),
        )
        .await
    );
    log_sink.stop();

    let snapshot = report.snapshot.expect("no round trips recorded");
    assert!(snapshot.count >= 1);
    assert!(snapshot.min <= snapshot.average && snapshot.average <= snapshot.max);
    assert!(report.messages_sent >= snapshot.count);
    assert!(report.messages_sent - snapshot.count <= 1);
}

#[tokio::test]
async fn test_client_fails_when_server_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = Config {
        addr: addr.to_string(),
        ..Config::default()
    };
    let log_sink = LogSink::new(io::sink(), LogSinkConfig::default());

    let result = client::run_until(&config, &log_sink, std::future::pending()).await;
    assert!(matches!(result, Err(ws_rtt::error::AppError::Connection(_))));
    log_sink.stop();
}
