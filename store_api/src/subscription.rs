use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::{Document, StoreError};

/// Result set delivered by a live listener.
pub type Snapshot = Vec<Document>;

/// One delivery on a subscription: a fresh result set or a non-fatal error.
pub type Notification = Result<Snapshot, StoreError>;

/// Create a connected listener pair. Store implementations keep the sink and
/// hand the [`Subscription`] to the caller.
pub fn channel() -> (SnapshotSink, Subscription) {
    let (tx, rx) = unbounded_channel();
    let cancel = CancellationToken::new();
    (
        SnapshotSink {
            tx,
            cancel: cancel.clone(),
        },
        Subscription { rx, cancel },
    )
}

/// Caller side of a live listener. Cancelling or dropping it releases the
/// listener on the store side; nothing is delivered afterwards.
#[derive(Debug)]
pub struct Subscription {
    rx: UnboundedReceiver<Notification>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Wait for the next notification. Returns `None` once cancelled or when
    /// the store side went away.
    pub async fn next(&mut self) -> Option<Notification> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            n = self.rx.recv() => n,
        }
    }

    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Store side of a live listener.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    tx: UnboundedSender<Notification>,
    cancel: CancellationToken,
}

impl SnapshotSink {
    /// Push a result set. Returns false when the subscriber is gone.
    pub fn deliver(&self, snapshot: Snapshot) -> bool {
        self.send(Ok(snapshot))
    }

    /// Report an error without closing the listener.
    pub fn fail(&self, err: StoreError) -> bool {
        self.send(Err(err))
    }

    fn send(&self, n: Notification) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(n).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the subscriber cancelled or dropped its handle.
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }
}
