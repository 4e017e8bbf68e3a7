use store_api::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// A query or write failed at the store.
    #[error(transparent)]
    StoreUnavailable(StoreError),
    /// A live listener reported a problem without closing.
    #[error(transparent)]
    Subscription(StoreError),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("document {id} is invalid: {reason}")]
    InvalidDocument { id: String, reason: String },
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Subscription(_) => ChatError::Subscription(err),
            StoreError::Unavailable(_) => ChatError::StoreUnavailable(err),
        }
    }
}
