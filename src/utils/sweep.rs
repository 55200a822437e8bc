//! Fallback-path participants never produce a disconnect event, so a
//! periodic task evicts the ones that have gone quiet. Eviction runs the
//! normal leave path: system message, room deletion when empty. Socket
//! participants are left alone, their own task cleans up on disconnect.

use chrono::{DateTime, Duration, Utc};
use tokio::time;

use crate::relay::presence;
use crate::state::RoomMap;

pub const IDLE_TTL_SECS: i64 = 300;

pub async fn task(rooms: RoomMap) {
    let mut tick = time::interval(time::Duration::from_secs(30));
    loop {
        tick.tick().await;
        sweep_once(&rooms, Utc::now() - Duration::seconds(IDLE_TTL_SECS)).await;
    }
}

pub async fn sweep_once(rooms: &RoomMap, cutoff: DateTime<Utc>) -> usize {
    let idle: Vec<(String, String)> = {
        let map = rooms.read().await;
        map.iter()
            .flat_map(|(room_id, room)| {
                room.participants
                    .iter()
                    .filter(|(_, p)| !p.via_socket && p.last_seen < cutoff)
                    .map(move |(id, _)| (room_id.clone(), id.clone()))
            })
            .collect()
    };

    let mut evicted = 0;
    for (room_id, identity) in idle {
        match presence::leave(rooms, &room_id, Some(&identity), None).await {
            Ok(_) => {
                evicted += 1;
                tracing::info!(room = %room_id, id = %identity, "idle participant evicted");
            }
            // already gone, e.g. left normally between the scan and now
            Err(e) => tracing::debug!(room = %room_id, error = %e, "sweep skipped"),
        }
    }
    evicted
}
