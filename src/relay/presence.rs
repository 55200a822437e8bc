use tokio::sync::broadcast;
use uuid::Uuid;

use super::{now_ms, push};
use crate::error::AppErr;
use crate::state::{ChatMessage, Outgoing, Participant, Room, RoomMap, RoomSnapshot, Tx};

pub struct Joined {
    pub snapshot: RoomSnapshot,
    pub tx: Tx,
    /// Subscribed while the registry lock is still held, so nothing
    /// broadcast after `join` returns can slip past the joiner. The join
    /// announcement itself is only in the snapshot, never delivered twice.
    pub rx: broadcast::Receiver<Outgoing>,
}

#[derive(Debug)]
pub struct Departure {
    pub username: String,
    pub room_deleted: bool,
}

/// Add a participant, creating the room lazily. Any existing entry sharing
/// the username is evicted first: a reconnect without a clean disconnect
/// leaves a stale entry behind, keyed by a dead connection id.
pub async fn join(
    rooms: &RoomMap,
    room_id: &str,
    identity: &str,
    username: &str,
    via_socket: bool,
) -> Joined {
    let mut map = rooms.write().await;
    let room = map.entry(room_id.to_string()).or_default();

    room.participants.retain(|_, p| p.username != username);
    room.participants
        .insert(identity.to_string(), Participant::new(username, via_socket));
    system(room, format!("{username} joined the room"));
    tracing::info!(room = room_id, user = username, "joined");

    let rx = room.tx.subscribe();
    Joined {
        snapshot: room.snapshot(),
        tx: room.tx.clone(),
        rx,
    }
}

/// Remove a participant, matching by identity first and falling back to the
/// username hint. The room is deleted in the same critical section when the
/// last participant leaves.
pub async fn leave(
    rooms: &RoomMap,
    room_id: &str,
    identity: Option<&str>,
    username_hint: Option<&str>,
) -> Result<Departure, AppErr> {
    let mut map = rooms.write().await;
    let room = map.get_mut(room_id).ok_or(AppErr::NotFound("room"))?;

    let key = identity
        .filter(|id| room.participants.contains_key(*id))
        .map(str::to_string)
        .or_else(|| {
            username_hint.and_then(|name| {
                room.participants
                    .iter()
                    .find(|(_, p)| p.username == name)
                    .map(|(k, _)| k.clone())
            })
        });
    let Some(gone) = key.and_then(|k| room.participants.remove(&k)) else {
        return Err(AppErr::NotFound("participant"));
    };

    system(room, format!("{} left the room", gone.username));
    tracing::info!(room = room_id, user = %gone.username, "left");

    let room_deleted = room.participants.is_empty();
    if room_deleted {
        map.remove(room_id);
        tracing::info!(room = room_id, "room deleted");
    }

    Ok(Departure {
        username: gone.username,
        room_deleted,
    })
}

/// System messages bypass chat deduplication: every matched join/leave must
/// announce exactly once, even inside the duplicate window.
fn system(room: &mut Room, text: String) {
    let msg = ChatMessage {
        id: Uuid::new_v4().to_string(),
        user: "System".to_string(),
        text,
        timestamp: now_ms(),
    };
    push(&room.tx, super::chat_frame(&msg), None);
    room.messages.push(msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RoomMap;

    #[tokio::test]
    async fn first_join_creates_the_room() {
        let rooms = RoomMap::default();
        let joined = join(&rooms, "r1", "c1", "alice", true).await;

        assert_eq!(joined.snapshot.users.len(), 1);
        assert_eq!(joined.snapshot.users[0].username, "alice");
        assert!(rooms.read().await.contains_key("r1"));
    }

    #[tokio::test]
    async fn rejoin_evicts_the_stale_entry_for_that_username() {
        let rooms = RoomMap::default();
        join(&rooms, "r1", "old-conn", "alice", true).await;
        let joined = join(&rooms, "r1", "new-conn", "alice", true).await;

        assert_eq!(joined.snapshot.users.len(), 1);
        assert_eq!(joined.snapshot.users[0].user_id, "new-conn");

        let map = rooms.read().await;
        let room = &map["r1"];
        assert!(!room.participants.contains_key("old-conn"));
        assert!(room.participants.contains_key("new-conn"));
    }

    #[tokio::test]
    async fn join_and_leave_each_announce_once() {
        let rooms = RoomMap::default();
        join(&rooms, "r1", "c1", "alice", true).await;
        join(&rooms, "r1", "c2", "bob", true).await;
        leave(&rooms, "r1", Some("c2"), None).await.unwrap();

        let map = rooms.read().await;
        let room = &map["r1"];
        assert_eq!(room.participants.len(), 1);
        let system: Vec<_> = room
            .messages
            .iter()
            .filter(|m| m.user == "System")
            .collect();
        assert_eq!(system.len(), 3);
        assert!(system[1].text.contains("bob joined"));
        assert!(system[2].text.contains("bob left"));
    }

    #[tokio::test]
    async fn last_leave_deletes_the_room() {
        let rooms = RoomMap::default();
        join(&rooms, "r1", "c1", "alice", true).await;
        let dep = leave(&rooms, "r1", Some("c1"), None).await.unwrap();

        assert!(dep.room_deleted);
        assert!(rooms.read().await.is_empty());
    }

    #[tokio::test]
    async fn leave_falls_back_to_the_username_hint() {
        let rooms = RoomMap::default();
        join(&rooms, "r1", "c1", "alice", true).await;
        join(&rooms, "r1", "c2", "bob", true).await;

        let dep = leave(&rooms, "r1", Some("dead-conn"), Some("bob"))
            .await
            .unwrap();
        assert_eq!(dep.username, "bob");
        assert!(!dep.room_deleted);
    }

    #[tokio::test]
    async fn late_disconnect_of_an_evicted_session_is_a_noop() {
        let rooms = RoomMap::default();
        join(&rooms, "r1", "old-conn", "alice", true).await;
        // alice reconnects on a fresh socket, evicting the old entry
        join(&rooms, "r1", "new-conn", "alice", true).await;

        // the dead socket's read loop finally returns; identity-only leave,
        // no username hint, must not touch the fresh session
        let err = leave(&rooms, "r1", Some("old-conn"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppErr::NotFound("participant")));

        let map = rooms.read().await;
        let room = &map["r1"];
        assert!(room.participants.contains_key("new-conn"));
        assert!(!room.messages.iter().any(|m| m.text.contains("left")));
    }

    #[tokio::test]
    async fn joiner_is_subscribed_before_the_lock_releases() {
        let rooms = RoomMap::default();
        let mut alice = join(&rooms, "r1", "c1", "alice", true).await;

        // own announcement arrives via the snapshot only
        assert!(alice.rx.try_recv().is_err());

        join(&rooms, "r1", "c2", "bob", true).await;
        let out = alice.rx.try_recv().unwrap();
        assert!(out.json.contains("bob joined"));
    }

    #[tokio::test]
    async fn leave_of_an_unknown_participant_is_not_found() {
        let rooms = RoomMap::default();
        join(&rooms, "r1", "c1", "alice", true).await;

        let err = leave(&rooms, "r1", Some("nobody"), None).await.unwrap_err();
        assert!(matches!(err, AppErr::NotFound("participant")));

        let err = leave(&rooms, "missing", Some("c1"), None).await.unwrap_err();
        assert!(matches!(err, AppErr::NotFound("room")));
    }
}
