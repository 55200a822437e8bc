use chrono::Utc;
use uuid::Uuid;

use super::{chat_frame, now_ms, push};
use crate::error::AppErr;
use crate::state::{ChatMessage, RoomMap};

/// A resend of the same `(user, text)` whose stored timestamp is within this
/// window of now is dropped. Guards against double submission when a client
/// fires on both transports.
pub const DEDUP_WINDOW_MS: i64 = 2_000;

/// Append a chat message and fan it out to the whole room, sender included
/// (the UI keys messages by id, so the echo never renders twice).
///
/// Returns `Ok(None)` when the message was dropped as a duplicate.
pub async fn post(
    rooms: &RoomMap,
    room_id: &str,
    user: &str,
    text: &str,
    supplied_ts: Option<i64>,
) -> Result<Option<ChatMessage>, AppErr> {
    let mut map = rooms.write().await;
    let room = map.get_mut(room_id).ok_or(AppErr::NotFound("room"))?;

    let now = now_ms();
    let duplicate = room
        .messages
        .iter()
        .any(|m| m.user == user && m.text == text && (now - m.timestamp).abs() <= DEDUP_WINDOW_MS);
    if duplicate {
        tracing::debug!(room = room_id, user, "duplicate chat dropped");
        return Ok(None);
    }

    // fallback participants have no disconnect event; chatting proves liveness
    for p in room.participants.values_mut() {
        if !p.via_socket && p.username == user {
            p.last_seen = Utc::now();
        }
    }

    let msg = ChatMessage {
        id: Uuid::new_v4().to_string(),
        user: user.to_string(),
        text: text.to_string(),
        timestamp: supplied_ts.unwrap_or(now),
    };
    push(&room.tx, chat_frame(&msg), None);
    room.messages.push(msg.clone());
    Ok(Some(msg))
}
