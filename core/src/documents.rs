//! Conversion between the chat model and store documents.

use store_api::{Document, FieldValue, Fields};
use tracing::warn;

use crate::{
    error::ChatError,
    model::{ChatMessage, ChatRoom},
};

pub const ROOMS: &str = "rooms";
pub const MESSAGES: &str = "messages";

pub const ROOM_ID: &str = "roomId";
pub const NAME: &str = "name";
pub const MESSAGE: &str = "message";
pub const CREATED_AT: &str = "createdAt";

/// Fields for a new room; the store stamps `createdAt`.
pub fn new_room_fields(room_id: &str, name: &str) -> Fields {
    Fields::from([
        (ROOM_ID.to_string(), FieldValue::from(room_id)),
        (NAME.to_string(), FieldValue::from(name)),
        (CREATED_AT.to_string(), FieldValue::ServerTimestamp),
    ])
}

/// Fields for a new message; the store stamps `createdAt`.
pub fn new_message_fields(room_id: &str, text: &str) -> Fields {
    Fields::from([
        (ROOM_ID.to_string(), FieldValue::from(room_id)),
        (MESSAGE.to_string(), FieldValue::from(text)),
        (CREATED_AT.to_string(), FieldValue::ServerTimestamp),
    ])
}

fn invalid(doc: &Document, reason: &str) -> ChatError {
    ChatError::InvalidDocument {
        id: doc.id.clone(),
        reason: reason.to_string(),
    }
}

pub fn room_from_document(doc: &Document) -> Result<ChatRoom, ChatError> {
    Ok(ChatRoom {
        room_id: doc
            .str_field(ROOM_ID)
            .ok_or_else(|| invalid(doc, "missing roomId"))?
            .to_string(),
        name: doc
            .str_field(NAME)
            .ok_or_else(|| invalid(doc, "missing name"))?
            .to_string(),
        created_at: doc
            .timestamp_field(CREATED_AT)
            .ok_or_else(|| invalid(doc, "missing createdAt"))?,
    })
}

pub fn message_from_document(doc: &Document) -> Result<ChatMessage, ChatError> {
    Ok(ChatMessage {
        room_id: doc
            .str_field(ROOM_ID)
            .ok_or_else(|| invalid(doc, "missing roomId"))?
            .to_string(),
        message: doc
            .str_field(MESSAGE)
            .ok_or_else(|| invalid(doc, "missing message"))?
            .to_string(),
        created_at: doc
            .timestamp_field(CREATED_AT)
            .ok_or_else(|| invalid(doc, "missing createdAt"))?,
    })
}

/// Decode every document, dropping the ones that do not fit with a warning.
pub fn decode_all<T>(
    docs: Vec<Document>,
    decode: impl Fn(&Document) -> Result<T, ChatError>,
) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode(doc) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!("{err}");
                None
            }
        })
        .collect()
}
