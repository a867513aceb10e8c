use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use buzzline_core::net::messages::{ClientMessage, ServerMessage};
use buzzline_core::room::Room;

use buzzline_server::build_app;
use buzzline_server::config::{LimitsConfig, RoomsConfig, ServerConfig};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// Server with the join-miss fallback switched off: joining an
    /// unknown code answers an ERROR frame instead of creating a room.
    pub async fn without_join_fallback() -> Self {
        let config = ServerConfig {
            rooms: RoomsConfig {
                create_on_join_miss: false,
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    /// Server admitting at most `n` concurrent WebSocket connections.
    pub async fn with_connection_cap(n: usize) -> Self {
        let config = ServerConfig {
            limits: LimitsConfig {
                max_ws_connections: n,
                ..LimitsConfig::default()
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _server: handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send a typed client event as a JSON text frame.
pub async fn ws_send(stream: &mut WsStream, msg: &ClientMessage) {
    let text = serde_json::to_string(msg).unwrap();
    stream.send(Message::Text(text.into())).await.unwrap();
}

/// Send a raw text frame (for malformed-input tests).
pub async fn ws_send_raw(stream: &mut WsStream, text: &str) {
    stream
        .send(Message::Text(text.to_string().into()))
        .await
        .unwrap();
}

/// Read the next server message (5s timeout).
pub async fn ws_read(stream: &mut WsStream) -> ServerMessage {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).unwrap();
                },
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Try to read a server message, returning None when nothing arrives in
/// the window. Used for "no broadcast" assertions.
pub async fn ws_try_read(stream: &mut WsStream, timeout_ms: u64) -> Option<ServerMessage> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).unwrap();
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Create a room and return its snapshot. Consumes the ROOM_CREATED reply.
pub async fn ws_create_room(stream: &mut WsStream, user_id: &str, username: &str) -> Room {
    ws_send(
        stream,
        &ClientMessage::CreateRoom {
            user_id: user_id.to_string(),
            username: username.to_string(),
        },
    )
    .await;
    match ws_read(stream).await {
        ServerMessage::RoomCreated { room } => room,
        other => panic!("Expected ROOM_CREATED, got: {other:?}"),
    }
}

/// Join an existing room and return the ROOM_JOINED snapshot. The
/// caller's own PLAYER_JOINED broadcast is left in the stream.
pub async fn ws_join_room(
    stream: &mut WsStream,
    user_id: &str,
    username: &str,
    room_code: &str,
) -> Room {
    ws_send(
        stream,
        &ClientMessage::JoinRoom {
            user_id: user_id.to_string(),
            username: username.to_string(),
            room_code: room_code.to_string(),
        },
    )
    .await;
    match ws_read(stream).await {
        ServerMessage::RoomJoined { room } => room,
        other => panic!("Expected ROOM_JOINED, got: {other:?}"),
    }
}

pub async fn ws_press(
    stream: &mut WsStream,
    user_id: &str,
    username: &str,
    room_code: &str,
    timestamp: i64,
) {
    ws_send(
        stream,
        &ClientMessage::PressBuzzer {
            user_id: user_id.to_string(),
            username: username.to_string(),
            room_code: room_code.to_string(),
            timestamp,
        },
    )
    .await;
}

/// Set up a room with Alice hosting and Bob and Carol joined, with every
/// pending PLAYER_JOINED consumed on all three streams.
/// Returns (alice, bob, carol, room_code).
pub async fn setup_three_player_room(
    server: &TestServer,
) -> (WsStream, WsStream, WsStream, String) {
    let mut alice = ws_connect(&server.ws_url()).await;
    let room = ws_create_room(&mut alice, "alice", "Alice").await;
    let code = room.code;

    let mut bob = ws_connect(&server.ws_url()).await;
    ws_join_room(&mut bob, "bob", "Bob", &code).await;
    let _ = ws_read(&mut bob).await; // PLAYER_JOINED (2 players)
    let _ = ws_read(&mut alice).await; // PLAYER_JOINED (2 players)

    let mut carol = ws_connect(&server.ws_url()).await;
    ws_join_room(&mut carol, "carol", "Carol", &code).await;
    let _ = ws_read(&mut carol).await; // PLAYER_JOINED (3 players)
    let _ = ws_read(&mut alice).await; // PLAYER_JOINED (3 players)
    let _ = ws_read(&mut bob).await; // PLAYER_JOINED (3 players)

    (alice, bob, carol, code)
}
