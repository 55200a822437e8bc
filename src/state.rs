use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// A frame queued on a room's push channel. `skip` carries the identity of
/// the originating connection when the frame must not echo back to it
/// (playback updates); chat and system messages leave it empty.
#[derive(Clone, Debug)]
pub struct Outgoing {
    pub json: String,
    pub skip: Option<String>,
}

pub type Tx = broadcast::Sender<Outgoing>;

/* ------------ participants ------------ */

#[derive(Clone, Debug)]
pub struct Participant {
    pub username: String,
    pub joined_at: DateTime<Utc>,
    /// Refreshed on fallback chat; the idle sweeper only looks at this for
    /// HTTP participants, sockets clean up after themselves on disconnect.
    pub last_seen: DateTime<Utc>,
    pub via_socket: bool,
}

impl Participant {
    pub fn new(username: &str, via_socket: bool) -> Self {
        let now = Utc::now();
        Self {
            username: username.to_string(),
            joined_at: now,
            last_seen: now,
            via_socket,
        }
    }
}

/* ------------ playback & chat ------------ */

/// Single canonical playback snapshot per room. Last write wins; there is no
/// sequence number, so out-of-order delivery can make this regress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_time: f64,
    pub is_playing: bool,
}

/// Timestamps are epoch milliseconds, matching what the browser sends.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user: String,
    pub text: String,
    pub timestamp: i64,
}

/* ------------ rooms ------------ */

pub struct Room {
    pub tx: Tx,
    pub participants: HashMap<String, Participant>,
    pub playback: PlaybackState,
    pub messages: Vec<ChatMessage>,
}

impl Room {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self {
            tx,
            participants: HashMap::new(),
            playback: PlaybackState::default(),
            messages: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let mut users: Vec<UserEntry> = self
            .participants
            .iter()
            .map(|(id, p)| UserEntry {
                user_id: id.clone(),
                username: p.username.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        RoomSnapshot {
            users,
            video_state: self.playback,
            messages: self.messages.clone(),
        }
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

/// The Room Registry. The write lock is held for the whole of every
/// join/leave/chat/playback mutation, which stands in for the single-writer
/// event loop of the original design.
pub type RoomMap = Arc<RwLock<HashMap<String, Room>>>;

/* ------------ read surface ------------ */

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    pub user_id: String,
    pub username: String,
}

/// What a joiner (or the fallback join response) sees of a room. The hosted
/// document store keeps its own room metadata; the relay never reads or
/// reconciles it, the front end subscribes to that store directly.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub users: Vec<UserEntry>,
    pub video_state: PlaybackState,
    pub messages: Vec<ChatMessage>,
}
