//! Room coordination: presence, playback sync and chat fan-out. Both the
//! WebSocket path and the HTTP fallback path call into these functions, so
//! every mutation goes through the same registry lock.

pub mod chat;
pub mod playback;
pub mod presence;

use serde_json::{json, Value};

use crate::state::{ChatMessage, Outgoing, Tx};

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Queue a frame on a room's push channel. A room that only fallback clients
/// ever touched has no subscribers, which is not an error.
pub(crate) fn push(tx: &Tx, frame: Value, skip: Option<&str>) {
    tx.send(Outgoing {
        json: frame.to_string(),
        skip: skip.map(str::to_string),
    })
    .ok();
}

pub(crate) fn chat_frame(m: &ChatMessage) -> Value {
    json!({
        "type": "chat_message",
        "id": m.id,
        "user": m.user,
        "text": m.text,
        "timestamp": m.timestamp,
    })
}
