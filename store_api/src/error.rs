use thiserror::Error;

/// Failures reported by a document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A read or write did not reach the backend or was rejected by it.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A live listener hit a problem but stays open.
    #[error("subscription error: {0}")]
    Subscription(String),
}
