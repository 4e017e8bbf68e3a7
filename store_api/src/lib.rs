//! Contract between the chat components and a document store.
//!
//! A store keeps schemaless documents in named collections and offers three
//! operations: create a document, run a one-shot [`Query`], and open a live
//! [`Subscription`] that re-delivers the query result whenever it changes.

use async_trait::async_trait;

mod document;
mod error;
mod query;
mod subscription;

pub use document::{resolve_server_timestamps, Document, FieldValue, Fields};
pub use error::StoreError;
pub use query::{Direction, Filter, OrderBy, Query};
pub use subscription::{channel, Notification, Snapshot, SnapshotSink, Subscription};

/// A hosted or embedded document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write `fields` into `collection`. With `id` set the document is stored
    /// under that key (replacing an existing one), otherwise the store picks
    /// a fresh id. [`FieldValue::ServerTimestamp`] sentinels are replaced by
    /// the store clock and the stored document is returned.
    async fn create(
        &self,
        collection: &str,
        id: Option<String>,
        fields: Fields,
    ) -> Result<Document, StoreError>;

    /// Run a query once.
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Open a live listener for `query`. The first notification carries the
    /// current result; later ones are sent only when the result changes.
    async fn subscribe(&self, query: &Query) -> Result<Subscription, StoreError>;
}
