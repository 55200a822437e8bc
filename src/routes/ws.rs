//! Push channel: one WebSocket per client, JSON text frames tagged by
//! `type`. Malformed or incomplete events are logged and dropped with no
//! reply; the socket stays open.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::relay::{chat, playback, presence};
use crate::state::{Outgoing, RoomMap};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String, username: String },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        room_id: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    VideoStateUpdate {
        room_id: String,
        current_time: f64,
        is_playing: bool,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room_id: String,
        user: String,
        text: String,
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

pub fn router() -> Router {
    Router::new().route("/room", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(rooms): Extension<RoomMap>,
) -> impl IntoResponse {
    let conn_id = Uuid::new_v4().to_string();
    ws.on_upgrade(move |sock| client_loop(sock, conn_id, rooms))
}

/// Pipe room broadcasts to this client's outbox, honouring the origin
/// exclusion tag. The receiver was subscribed inside the join mutation, so
/// no frame broadcast since then is missed.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<Outgoing>,
    conn_id: String,
    outbox: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(out) => {
                    if out.skip.as_deref() == Some(conn_id.as_str()) {
                        continue;
                    }
                    if outbox.send(out.json).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(conn = %conn_id, skipped = n, "slow socket lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn client_loop(sock: WebSocket, conn_id: String, rooms: RoomMap) {
    let (mut sink, mut stream) = sock.split();
    let (outbox, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // (room_id, username) once join_room has been seen on this socket
    let mut joined: Option<(String, String)> = None;
    let mut forwarder: Option<JoinHandle<()>> = None;

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(raw) = msg else { continue };
        let ev = match serde_json::from_str::<ClientEvent>(&raw) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::debug!(conn = %conn_id, error = %e, "dropping malformed event");
                continue;
            }
        };

        match ev {
            ClientEvent::JoinRoom { room_id, username } => {
                // switching rooms on one socket implies leaving the old one;
                // identity only, a username hint here could take out a fresh
                // session after this entry was evicted by a rejoin
                if let Some((old_room, _)) = joined.take() {
                    if let Some(f) = forwarder.take() {
                        f.abort();
                    }
                    let _ = presence::leave(&rooms, &old_room, Some(&conn_id), None).await;
                }

                let entered = presence::join(&rooms, &room_id, &conn_id, &username, true).await;
                let hello = json!({
                    "type": "room_users",
                    "users": entered.snapshot.users,
                    "videoState": entered.snapshot.video_state,
                    "messages": entered.snapshot.messages,
                });
                outbox.send(hello.to_string()).ok();

                forwarder = Some(spawn_forwarder(entered.rx, conn_id.clone(), outbox.clone()));
                joined = Some((room_id, username));
            }
            ClientEvent::LeaveRoom {
                room_id,
                user_id,
                username,
            } => {
                if let Some(f) = forwarder.take() {
                    f.abort();
                }
                joined = None;
                let identity = user_id.unwrap_or_else(|| conn_id.clone());
                if let Err(e) =
                    presence::leave(&rooms, &room_id, Some(&identity), username.as_deref()).await
                {
                    tracing::debug!(room = %room_id, error = %e, "leave ignored");
                }
            }
            ClientEvent::VideoStateUpdate {
                room_id,
                current_time,
                is_playing,
            } => {
                let name = joined.as_ref().map(|(_, n)| n.as_str());
                playback::update(
                    &rooms,
                    &room_id,
                    current_time,
                    is_playing,
                    Some(&conn_id),
                    name,
                )
                .await;
            }
            ClientEvent::ChatMessage {
                room_id,
                user,
                text,
                timestamp,
            } => {
                if let Err(e) = chat::post(&rooms, &room_id, &user, &text, timestamp).await {
                    tracing::debug!(room = %room_id, error = %e, "chat dropped");
                }
            }
        }
    }

    // socket gone: clean up presence by identity only. If a rejoin already
    // evicted this entry the leave is a not-found, which is the expected
    // no-op, and the fresh session stays untouched.
    if let Some(f) = forwarder.take() {
        f.abort();
    }
    if let Some((room_id, _)) = joined {
        if let Err(e) = presence::leave(&rooms, &room_id, Some(&conn_id), None).await {
            tracing::debug!(room = %room_id, error = %e, "disconnect leave ignored");
        }
    }
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_parse_from_camel_case_wire_frames() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"type":"join_room","roomId":"abc","username":"A"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::JoinRoom { .. }));

        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"video_state_update","roomId":"abc","currentTime":42.0,"isPlaying":true}"#,
        )
        .unwrap();
        match ev {
            ClientEvent::VideoStateUpdate {
                current_time,
                is_playing,
                ..
            } => {
                assert_eq!(current_time, 42.0);
                assert!(is_playing);
            }
            _ => panic!("wrong variant"),
        }

        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"chat_message","roomId":"abc","user":"A","text":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(ev, ClientEvent::ChatMessage { timestamp: None, .. }));
    }

    #[test]
    fn incomplete_events_are_rejected_by_the_parser() {
        // missing username: dropped before any state change
        let r = serde_json::from_str::<ClientEvent>(r#"{"type":"join_room","roomId":"abc"}"#);
        assert!(r.is_err());

        let r = serde_json::from_str::<ClientEvent>(r#"{"type":"no_such_event"}"#);
        assert!(r.is_err());
    }
}
