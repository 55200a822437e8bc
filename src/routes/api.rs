//! Fallback transport: one POST per action, same semantics as the socket
//! events. Bodies are parsed loosely so a missing field maps to a 400 rather
//! than a deserializer rejection. A client that only ever uses this path is
//! write-only: it receives no broadcasts unless it also holds a socket.

use axum::{extract::Extension, routing::post, Json, Router};
use serde_json::{json, Value};

use crate::error::{bad, AppErr, AppResult};
use crate::relay::{chat, playback, presence};
use crate::state::RoomMap;

/// Stand-in for a real account system.
const SITE_PASSWORD: &str = "movienight";

pub fn router() -> Router {
    Router::new()
        .route("/room/join", post(join))
        .route("/room/leave", post(leave))
        .route("/room/video-state", post(video_state))
        .route("/room/chat", post(chat_message))
        .route("/auth/login", post(login))
}

fn str_field<'a>(body: &'a Value, key: &'static str) -> Result<&'a str, AppErr> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(AppErr::Missing(key))
}

async fn join(
    Extension(rooms): Extension<RoomMap>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let room_id = str_field(&body, "roomId")?;
    let username = str_field(&body, "username")?;

    // no socket behind this participant, so mint an identity for it
    let user_id = format!("http-{}", nanoid::nanoid!(10));
    let entered = presence::join(&rooms, room_id, &user_id, username, false).await;

    Ok(Json(json!({ "userId": user_id, "room": entered.snapshot })))
}

async fn leave(
    Extension(rooms): Extension<RoomMap>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let room_id = str_field(&body, "roomId")?;
    let user_id = body.get("userId").and_then(Value::as_str);
    let username = body.get("username").and_then(Value::as_str);
    if user_id.is_none() && username.is_none() {
        return Err(AppErr::Missing("userId"));
    }

    let dep = presence::leave(&rooms, room_id, user_id, username).await?;
    Ok(Json(json!({ "success": true, "roomDeleted": dep.room_deleted })))
}

async fn video_state(
    Extension(rooms): Extension<RoomMap>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let room_id = str_field(&body, "roomId")?;
    let current_time = body
        .get("currentTime")
        .and_then(Value::as_f64)
        .ok_or(AppErr::Missing("currentTime"))?;
    let is_playing = body
        .get("isPlaying")
        .and_then(Value::as_bool)
        .ok_or(AppErr::Missing("isPlaying"))?;

    // origin is not tracked here, everyone gets the broadcast back
    if !playback::update(&rooms, room_id, current_time, is_playing, None, None).await {
        return Err(AppErr::NotFound("room"));
    }
    Ok(Json(json!({ "success": true })))
}

async fn chat_message(
    Extension(rooms): Extension<RoomMap>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let room_id = str_field(&body, "roomId")?;
    let user = str_field(&body, "user")?;
    let text = str_field(&body, "text")?;
    let timestamp = body.get("timestamp").and_then(Value::as_i64);

    // a deduplicated resend is still a success to the caller
    chat::post(&rooms, room_id, user, text, timestamp).await?;
    Ok(Json(json!({ "success": true })))
}

async fn login(Json(body): Json<Value>) -> AppResult<Json<Value>> {
    let password = str_field(&body, "password")?;
    if password != SITE_PASSWORD {
        return Err(bad("wrong password"));
    }
    Ok(Json(json!({ "success": true })))
}
