#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use beacon_broker::config::Config;
use beacon_broker::signaling::heartbeat;
use beacon_broker::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A broker config suitable for tests: defaults everywhere, overridden per
/// case with struct update syntax.
pub fn test_config() -> Config {
    Config::default()
}

/// Start a real broker on an ephemeral port. Returns the bound address and
/// the state for direct inspection.
pub async fn start_server(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::new(config);

    heartbeat::spawn(
        state.registry.clone(),
        state.dispatcher.clone(),
        state.config.heartbeat_interval,
    );

    let app = beacon_broker::routes::router().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Connect to the broker and read the initial `id` frame.
pub async fn connect(addr: SocketAddr) -> (WsStream, String) {
    connect_to(format!("ws://{addr}/ws")).await
}

/// Connect with a `token` query parameter.
pub async fn connect_with_token(addr: SocketAddr, token: &str) -> (WsStream, String) {
    connect_to(format!("ws://{addr}/ws?token={token}")).await
}

async fn connect_to(url: String) -> (WsStream, String) {
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let id_frame = recv_json(&mut ws).await;
    assert_eq!(id_frame["type"], "id", "first server frame must be id");
    let id = id_frame["id"].as_str().expect("id present").to_string();
    (ws, id)
}

/// Send one JSON frame.
pub async fn send_json(ws: &mut WsStream, value: &serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Send raw text.
pub async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(tungstenite::Message::Text(text.to_string().into()))
        .await
        .expect("ws send");
}

/// Read the next text frame as JSON, skipping transport control frames.
pub async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse frame");
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Assert that no data frame arrives within `window`.
pub async fn expect_silence(ws: &mut WsStream, window: Duration) {
    loop {
        match time::timeout(window, ws.next()).await {
            Err(_) => return, // quiet
            Ok(Some(Ok(tungstenite::Message::Ping(_))))
            | Ok(Some(Ok(tungstenite::Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

/// Read until a close frame (or abrupt end) and return the close code, if
/// one was delivered.
pub async fn expect_close(ws: &mut WsStream) -> Option<u16> {
    loop {
        let next = time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timeout waiting for close");
        match next {
            Some(Ok(tungstenite::Message::Close(frame))) => {
                return frame.map(|f| u16::from(f.code));
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

/// Join a room and drain the two confirmation frames.
pub async fn join_room(ws: &mut WsStream, room: &str) {
    send_json(ws, &serde_json::json!({"type": "join-room", "room": room})).await;
    let joined = recv_json(ws).await;
    assert_eq!(joined["type"], "room-joined");
    assert_eq!(joined["room"], room);
    let peers = recv_json(ws).await;
    assert_eq!(peers["type"], "room-peers");
}

/// Fetch the /status snapshot.
pub async fn get_status(addr: SocketAddr) -> serde_json::Value {
    reqwest::get(format!("http://{addr}/status"))
        .await
        .expect("status request")
        .json()
        .await
        .expect("status json")
}
