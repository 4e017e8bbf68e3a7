pub mod app;
pub mod cli;
pub mod config;
pub mod directory;
pub mod documents;
pub mod error;
pub mod events;
pub mod model;
pub mod timeline;

pub use directory::RoomDirectory;
pub use error::ChatError;
pub use events::{EventChannel, EventReceiver, Notice, RoomSelected};
pub use model::{ChatMessage, ChatRoom};
pub use timeline::RoomTimeline;
