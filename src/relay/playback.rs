use serde_json::json;

use super::push;
use crate::state::{PlaybackState, RoomMap};

/// Receiving clients apply an incoming `currentTime` only when their local
/// position differs by more than this many seconds; inside the tolerance
/// they reconcile `isPlaying` alone. Keeps rooms from micro-seeking each
/// other in a feedback loop. The relay itself never filters on it.
pub const DRIFT_TOLERANCE_SECS: f64 = 1.0;

/// Overwrite the room's playback snapshot and fan the new state out. The
/// origin connection is excluded when known (socket path); the fallback
/// path does not track origin and re-sends to everyone. No staleness check:
/// last write wins, even if it regresses.
///
/// Returns false when the room does not exist (silent no-op on the socket
/// path; the HTTP path turns it into a 404).
pub async fn update(
    rooms: &RoomMap,
    room_id: &str,
    current_time: f64,
    is_playing: bool,
    origin_id: Option<&str>,
    origin_name: Option<&str>,
) -> bool {
    let mut map = rooms.write().await;
    let Some(room) = map.get_mut(room_id) else {
        tracing::debug!(room = room_id, "playback update for unknown room");
        return false;
    };

    room.playback = PlaybackState {
        current_time,
        is_playing,
    };

    let mut frame = json!({
        "type": "video_state_update",
        "currentTime": current_time,
        "isPlaying": is_playing,
    });
    if let Some(id) = origin_id {
        frame["userId"] = json!(id);
    }
    if let Some(name) = origin_name {
        frame["username"] = json!(name);
    }
    push(&room.tx, frame, origin_id);
    true
}
