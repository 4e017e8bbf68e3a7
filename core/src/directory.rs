use std::sync::Arc;

use store_api::{DocumentStore, Query};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    documents::{self, ROOMS},
    error::ChatError,
    events::{EventChannel, Notice, RoomSelected},
    model::ChatRoom,
};

/// List of chat rooms plus the actions offered on it.
pub struct RoomDirectory {
    store: Arc<dyn DocumentStore>,
    events: EventChannel,
    rooms: Vec<ChatRoom>,
}

impl RoomDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, events: EventChannel) -> Self {
        Self {
            store,
            events,
            rooms: Vec::new(),
        }
    }

    /// Rooms from the last successful fetch.
    pub fn rooms(&self) -> &[ChatRoom] {
        &self.rooms
    }

    /// Fetch every room. On failure the previously fetched list is kept.
    pub async fn list_rooms(&mut self) -> Result<&[ChatRoom], ChatError> {
        let docs = match self.store.query(&Query::collection(ROOMS)).await {
            Ok(docs) => docs,
            Err(err) => {
                warn!("loading rooms failed: {err}");
                return Err(err.into());
            }
        };
        self.rooms = documents::decode_all(docs, documents::room_from_document);
        debug!(count = self.rooms.len(), "rooms loaded");
        Ok(&self.rooms)
    }

    pub async fn refresh(&mut self) -> Result<&[ChatRoom], ChatError> {
        self.list_rooms().await
    }

    /// Create a room under a fresh id. The room list is reloaded afterwards
    /// whether or not the write went through.
    pub async fn create_room(&mut self, name: &str) -> Result<ChatRoom, ChatError> {
        let room_id = Uuid::new_v4().to_string();
        let result = self
            .store
            .create(
                ROOMS,
                Some(room_id.clone()),
                documents::new_room_fields(&room_id, name),
            )
            .await
            .map_err(ChatError::from)
            .and_then(|doc| documents::room_from_document(&doc));
        match &result {
            Ok(room) => {
                info!(room_id = %room.room_id, "created room {:?}", room.name);
                self.events.publish(Notice::RoomCreated {
                    name: name.to_string(),
                });
            }
            Err(err) => {
                warn!("creating room {name:?} failed: {err}");
                self.events.publish(Notice::RoomCreateFailed {
                    name: name.to_string(),
                    reason: err.to_string(),
                });
            }
        }
        // list_rooms logs its own failure and keeps the old list.
        let _ = self.list_rooms().await;
        result
    }

    /// Announce that a room was picked.
    pub fn select(&self, room_id: &str, name: &str) {
        let reached = self.events.publish(RoomSelected {
            room_id: room_id.to_string(),
            name: name.to_string(),
        });
        debug!(room_id, reached, "room selected");
    }

    /// Select the room at `index` of the current list.
    pub fn select_index(&self, index: usize) -> Option<&ChatRoom> {
        let room = self.rooms.get(index)?;
        self.select(&room.room_id, &room.name);
        Some(room)
    }
}
