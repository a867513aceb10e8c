use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use buzzline_core::net::messages::{ClientMessage, ServerMessage};
use buzzline_core::net::protocol::{decode_client_message, encode_server_message};

use crate::room_manager::{ConnId, Departure, PlayerSender, PressOutcome};
use crate::state::{AppState, ConnectionGuard};

/// Identity and room membership attached to a connection once it has
/// created or joined a room. Overwritten on each successful create/join.
struct Session {
    user_id: String,
    room_code: String,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let conn_id = state.alloc_conn_id();
    let (ws_sender, mut ws_receiver) = socket.split();

    let (tx, rx) = mpsc::channel::<Utf8Bytes>(state.config.limits.player_message_buffer);
    spawn_writer(ws_sender, rx);

    let mut session: Option<Session> = None;
    read_loop(&mut ws_receiver, &state, conn_id, &tx, &mut session).await;

    // Channel closed. Run the departure path for the attached session.
    let Some(sess) = session else {
        return;
    };
    let mut rooms = state.rooms.write().await;
    match rooms.remove_connection(&sess.room_code, conn_id, &sess.user_id) {
        Departure::RoomDeleted => {
            tracing::info!(room = %sess.room_code, "Room deleted after last player left");
        },
        Departure::PlayerLeft { players, new_host } => {
            rooms.broadcast_to_room(
                &sess.room_code,
                &ServerMessage::PlayerLeft { players, new_host },
            );
        },
        Departure::NotInRoom => {},
    }
    drop(rooms);

    tracing::info!(
        user_id = %sess.user_id,
        room = %sess.room_code,
        "Player disconnected"
    );
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Utf8Bytes>,
) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    conn_id: ConnId,
    tx: &PlayerSender,
    session: &mut Option<Session>,
) {
    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        // Malformed, oversized, and unknown-type frames are all dropped
        // without a reply; the connection stays open.
        let event = match decode_client_message(text.as_str()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(conn_id, error = %e, "Dropping undecodable frame");
                continue;
            },
        };

        dispatch_event(state, conn_id, tx, session, event).await;
    }
}

/// Route one decoded event to its room operation and emit the reply and
/// broadcast it calls for. Mutation and fan-out share the write lock, so
/// nothing observes a half-applied room.
async fn dispatch_event(
    state: &AppState,
    conn_id: ConnId,
    tx: &PlayerSender,
    session: &mut Option<Session>,
    event: ClientMessage,
) {
    match event {
        ClientMessage::CreateRoom { user_id, username } => {
            let mut rooms = state.rooms.write().await;
            if let Some(old) = session.take() {
                rooms.detach_connection(&old.room_code, conn_id);
            }
            let room = rooms.create_room(conn_id, tx.clone(), &user_id, &username);
            drop(rooms);
            tracing::info!(user_id = %user_id, room = %room.code, "Room created");
            *session = Some(Session {
                user_id,
                room_code: room.code.clone(),
            });
            reply(tx, &ServerMessage::RoomCreated { room });
        },

        ClientMessage::JoinRoom {
            user_id,
            username,
            room_code,
        } => {
            let prev_room = session.as_ref().map(|s| s.room_code.clone());
            let mut rooms = state.rooms.write().await;
            match rooms.join_room(&room_code, conn_id, tx.clone(), &user_id, &username) {
                Some(room) => {
                    if let Some(prev) = prev_room
                        && prev != room_code
                    {
                        rooms.detach_connection(&prev, conn_id);
                    }
                    let players = room.players.clone();
                    tracing::info!(user_id = %user_id, room = %room_code, "Player joined");
                    *session = Some(Session {
                        user_id,
                        room_code: room_code.clone(),
                    });
                    reply(tx, &ServerMessage::RoomJoined { room });
                    rooms.broadcast_to_room(&room_code, &ServerMessage::PlayerJoined { players });
                },
                None if state.config.rooms.create_on_join_miss => {
                    // Unknown code: the join degrades into creating a fresh
                    // room with the joiner as host.
                    if let Some(prev) = prev_room {
                        rooms.detach_connection(&prev, conn_id);
                    }
                    let room = rooms.create_room(conn_id, tx.clone(), &user_id, &username);
                    drop(rooms);
                    tracing::info!(
                        user_id = %user_id,
                        requested = %room_code,
                        room = %room.code,
                        "Join miss, created room instead"
                    );
                    *session = Some(Session {
                        user_id,
                        room_code: room.code.clone(),
                    });
                    reply(tx, &ServerMessage::RoomCreated { room });
                },
                None => {
                    reply(
                        tx,
                        &ServerMessage::Error {
                            message: "Room not found".to_string(),
                        },
                    );
                },
            }
        },

        ClientMessage::PressBuzzer {
            user_id,
            username,
            room_code,
            timestamp,
        } => {
            let mut rooms = state.rooms.write().await;
            match rooms.press_buzzer(&room_code, &user_id) {
                PressOutcome::Buzzed => {
                    rooms.broadcast_to_room(
                        &room_code,
                        &ServerMessage::BuzzerPressed {
                            player_id: user_id,
                            username,
                            timestamp,
                        },
                    );
                },
                PressOutcome::Locked => {
                    reply(
                        tx,
                        &ServerMessage::BuzzerLocked {
                            locked: true,
                            message: "Your buzzer is locked by the host".to_string(),
                        },
                    );
                },
                PressOutcome::Ignored => {},
            }
        },

        ClientMessage::ResetBuzzer { room_code } => {
            let Some(sess) = session.as_ref() else {
                return;
            };
            let mut rooms = state.rooms.write().await;
            if rooms.reset_buzzer(&room_code, &sess.user_id) {
                rooms.broadcast_to_room(&room_code, &ServerMessage::BuzzerReset {});
            }
        },

        ClientMessage::LockPlayerBuzzer {
            room_code,
            player_id,
            lock,
        } => {
            let Some(sess) = session.as_ref() else {
                return;
            };
            let mut rooms = state.rooms.write().await;
            if rooms.set_player_lock(&room_code, &sess.user_id, &player_id, lock) {
                rooms.broadcast_to_room(
                    &room_code,
                    &ServerMessage::PlayerBuzzerLocked {
                        player_id,
                        locked: lock,
                    },
                );
            }
        },

        ClientMessage::AwardPoints {
            room_code,
            player_id,
            points,
        } => {
            let Some(sess) = session.as_ref() else {
                return;
            };
            let mut rooms = state.rooms.write().await;
            if let Some((scores, players)) =
                rooms.award_points(&room_code, &sess.user_id, &player_id, points)
            {
                rooms.broadcast_to_room(
                    &room_code,
                    &ServerMessage::PointsUpdated { scores, players },
                );
            }
        },

        // Departure is handled uniformly on socket closure.
        ClientMessage::LeaveRoom {} => {},
    }
}

/// Queue a frame for the calling connection only. A full or closed
/// channel is dropped the same way broadcasts are.
fn reply(tx: &PlayerSender, msg: &ServerMessage) {
    match encode_server_message(msg) {
        Ok(text) => {
            if let Err(e) = tx.try_send(Utf8Bytes::from(text)) {
                tracing::debug!(error = %e, "Failed to queue reply");
            }
        },
        Err(e) => tracing::warn!(error = %e, "Failed to encode reply"),
    }
}
