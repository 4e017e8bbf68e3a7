//! Live message list of one room.
//!
//! Opening a timeline loads the full history once, remembers the creation
//! time of the newest message as the watermark and then subscribes to
//! messages strictly newer than that watermark, newest first, one per
//! notification. Each notification appends at most one message to the end
//! of the visible list.
//!
//! Messages sharing the exact creation time of the current append point are
//! not appended; stores that can hand out equal timestamps may therefore
//! drop one of them.

use std::sync::Arc;

use store_api::{Direction, DocumentStore, Query, Snapshot, Subscription};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    documents::{self, CREATED_AT, MESSAGES, ROOM_ID},
    error::ChatError,
    events::{EventChannel, Notice},
    model::ChatMessage,
};

pub struct RoomTimeline {
    store: Arc<dyn DocumentStore>,
    events: EventChannel,
    room_id: String,
    title: String,
    messages: Vec<ChatMessage>,
    watermark: OffsetDateTime,
    append_point: OffsetDateTime,
    tail: Option<Subscription>,
    closed: bool,
}

impl RoomTimeline {
    /// Open the timeline of `room_id`: load the history and start tailing.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        events: EventChannel,
        room_id: &str,
        room_name: &str,
    ) -> Result<Self, ChatError> {
        if room_id.is_empty() {
            return Err(ChatError::Validation("room id is required".into()));
        }
        let now = OffsetDateTime::now_utc();
        let mut timeline = Self {
            store,
            events,
            room_id: room_id.to_string(),
            title: room_name.to_string(),
            messages: Vec::new(),
            watermark: now,
            append_point: now,
            tail: None,
            closed: false,
        };
        info!(room_id, "opening timeline {room_name:?}");
        timeline.refresh().await;
        Ok(timeline)
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Visible messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn watermark(&self) -> OffsetDateTime {
        self.watermark
    }

    /// Whether a tail subscription is currently held.
    pub fn is_live(&self) -> bool {
        self.tail.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reload the history and restart the tail from the new watermark. A
    /// failed reload keeps the current list and tails from the old watermark.
    pub async fn refresh(&mut self) {
        if self.closed {
            debug!(room_id = %self.room_id, "refresh on closed timeline ignored");
            return;
        }
        let _ = self.load_initial().await;
        self.start_tail(self.watermark).await;
    }

    /// Fetch the whole history of the room in creation order, replace the
    /// visible list and move the watermark to its newest entry (or now).
    pub async fn load_initial(&mut self) -> Result<&[ChatMessage], ChatError> {
        let query = Query::collection(MESSAGES)
            .where_eq(ROOM_ID, self.room_id.as_str())
            .order_by(CREATED_AT, Direction::Ascending);
        let docs = match self.store.query(&query).await {
            Ok(docs) => docs,
            Err(err) => {
                warn!(room_id = %self.room_id, "loading messages failed: {err}");
                return Err(err.into());
            }
        };
        self.messages = documents::decode_all(docs, documents::message_from_document);
        self.watermark = self
            .messages
            .last()
            .map(|m| m.created_at)
            .unwrap_or_else(OffsetDateTime::now_utc);
        debug!(
            room_id = %self.room_id,
            count = self.messages.len(),
            watermark = %self.watermark,
            "messages loaded"
        );
        Ok(&self.messages)
    }

    /// Subscribe to messages created after `watermark`, replacing any
    /// previous subscription.
    pub async fn start_tail(&mut self, watermark: OffsetDateTime) {
        if self.closed {
            return;
        }
        if let Some(mut old) = self.tail.take() {
            old.cancel();
        }
        self.append_point = match self.messages.last() {
            Some(last) if last.created_at > watermark => last.created_at,
            _ => watermark,
        };
        let query = Query::collection(MESSAGES)
            .where_eq(ROOM_ID, self.room_id.as_str())
            .where_gt(CREATED_AT, watermark)
            .order_by(CREATED_AT, Direction::Descending)
            .limit(1);
        match self.store.subscribe(&query).await {
            Ok(sub) => {
                debug!(room_id = %self.room_id, watermark = %watermark, "tail started");
                self.tail = Some(sub);
            }
            Err(err) => warn!(room_id = %self.room_id, "tail subscription failed: {err}"),
        }
    }

    /// Wait until the tail appends a message and return it. Notifications
    /// that append nothing and subscription errors are consumed here.
    /// Returns `None` once closed or when the store ends the subscription.
    pub async fn next_update(&mut self) -> Option<ChatMessage> {
        loop {
            let tail = self.tail.as_mut()?;
            match tail.next().await {
                Some(Ok(snapshot)) => {
                    if let Some(message) = self.apply(snapshot) {
                        return Some(message.clone());
                    }
                }
                Some(Err(err)) => {
                    warn!(room_id = %self.room_id, "{}", ChatError::from(err));
                }
                None => {
                    debug!(room_id = %self.room_id, "tail ended");
                    self.tail = None;
                    return None;
                }
            }
        }
    }

    fn apply(&mut self, snapshot: Snapshot) -> Option<&ChatMessage> {
        debug!(room_id = %self.room_id, size = snapshot.len(), "tail notification");
        let doc = snapshot.into_iter().next()?;
        let message = match documents::message_from_document(&doc) {
            Ok(message) => message,
            Err(err) => {
                warn!("{err}");
                return None;
            }
        };
        if message.created_at <= self.append_point {
            return None;
        }
        self.append_point = message.created_at;
        self.messages.push(message);
        self.messages.last()
    }

    /// Write a message. The visible list is not touched; the message shows
    /// up once the tail delivers it.
    pub async fn send(&self, text: &str) -> Result<(), ChatError> {
        let fields = documents::new_message_fields(&self.room_id, text);
        match self.store.create(MESSAGES, None, fields).await {
            Ok(doc) => {
                debug!(room_id = %self.room_id, id = %doc.id, "message sent");
                Ok(())
            }
            Err(err) => {
                warn!(room_id = %self.room_id, "sending message failed: {err}");
                self.events.publish(Notice::SendFailed {
                    reason: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// Release the tail subscription. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut tail) = self.tail.take() {
            tail.cancel();
        }
        info!(room_id = %self.room_id, "timeline closed");
    }
}

impl Drop for RoomTimeline {
    fn drop(&mut self) {
        self.close();
    }
}
