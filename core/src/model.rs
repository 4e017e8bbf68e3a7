use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRoom {
    pub room_id: String,
    pub name: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub room_id: String,
    pub message: String,
    pub created_at: OffsetDateTime,
}
