use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use store_api::{Document, Query, SnapshotSink, StoreError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::StoreChange;

/// Counts a live listener for as long as it exists.
pub(crate) struct ListenerGuard(Arc<AtomicUsize>);

impl ListenerGuard {
    pub(crate) fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct Listener {
    pub(crate) pool: Pool<SqliteConnectionManager>,
    pub(crate) query: Query,
    pub(crate) sink: SnapshotSink,
    pub(crate) changes: broadcast::Receiver<StoreChange>,
    pub(crate) guard: ListenerGuard,
}

impl Listener {
    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(mut self) {
        let mut current = match self.requery().await {
            Ok(docs) => docs,
            Err(err) => {
                self.sink.fail(err);
                Vec::new()
            }
        };
        if !self.sink.deliver(current.clone()) {
            return;
        }
        loop {
            let change = tokio::select! {
                _ = self.sink.closed() => break,
                change = self.changes.recv() => change,
            };
            let next = match change {
                Ok(StoreChange::Created {
                    collection,
                    document,
                    replaced,
                }) => {
                    if collection != self.query.collection_name() {
                        continue;
                    }
                    if replaced {
                        self.requery().await
                    } else if self.query.matches(&document) {
                        Ok(fold(&self.query, &current, document))
                    } else {
                        continue;
                    }
                }
                Ok(StoreChange::External) => self.requery().await,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "listener on {} lagged", self.query.collection_name());
                    self.sink.fail(StoreError::Subscription(format!(
                        "listener missed {missed} changes"
                    )));
                    self.requery().await
                }
                Err(RecvError::Closed) => break,
            };
            match next {
                Ok(next) if next != current => {
                    current = next;
                    if !self.sink.deliver(current.clone()) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    self.sink.fail(StoreError::Subscription(err.to_string()));
                }
            }
        }
        debug!("listener on {} released", self.query.collection_name());
        drop(self.guard);
    }

    async fn requery(&self) -> Result<Vec<Document>, StoreError> {
        crate::run_query(self.pool.clone(), self.query.clone()).await
    }
}

/// Merge a newly created document into the current result set.
fn fold(query: &Query, current: &[Document], created: Document) -> Vec<Document> {
    let id = created.id.clone();
    query.apply(
        current
            .iter()
            .filter(|d| d.id != id)
            .cloned()
            .chain(std::iter::once(created)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_api::{Direction, FieldValue, Fields};

    fn doc(id: &str, n: i64) -> Document {
        Document::new(id, Fields::from([("n".to_string(), FieldValue::from(n))]))
    }

    #[test]
    fn fold_keeps_top_k() {
        let q = Query::collection("c")
            .order_by("n", Direction::Descending)
            .limit(1);
        let current = vec![doc("a", 1)];
        assert_eq!(fold(&q, &current, doc("b", 2)), vec![doc("b", 2)]);
        assert_eq!(fold(&q, &current, doc("c", 0)), vec![doc("a", 1)]);
    }

    #[test]
    fn fold_replaces_same_id() {
        let q = Query::collection("c").order_by("n", Direction::Ascending);
        let current = vec![doc("a", 1), doc("b", 2)];
        assert_eq!(
            fold(&q, &current, doc("a", 3)),
            vec![doc("b", 2), doc("a", 3)]
        );
    }
}
