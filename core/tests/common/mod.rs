#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chatsync::{ChatMessage, EventChannel, RoomTimeline};
use parking_lot::Mutex;
use sqlite_store::SqliteStore;
use store_api::{
    Document, DocumentStore, Fields, Query, SnapshotSink, StoreError, Subscription,
};
use tokio::time::timeout;

/// In-memory store with switches for injecting failures.
pub struct TestStore {
    pub inner: SqliteStore,
    pub fail_queries: AtomicBool,
    pub fail_writes: AtomicBool,
    /// Hand out subscriptions driven by the test instead of the store.
    pub scripted: AtomicBool,
    pub queries: AtomicUsize,
    pub sinks: Mutex<Vec<SnapshotSink>>,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_queries: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            scripted: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
            sinks: Mutex::new(Vec::new()),
        })
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn last_sink(&self) -> SnapshotSink {
        self.sinks.lock().last().cloned().expect("scripted subscription")
    }
}

#[async_trait]
impl DocumentStore for TestStore {
    async fn create(
        &self,
        collection: &str,
        id: Option<String>,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("offline".into()));
        }
        self.inner.create(collection, id, fields).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("offline".into()));
        }
        self.inner.query(query).await
    }

    async fn subscribe(&self, query: &Query) -> Result<Subscription, StoreError> {
        if self.scripted.load(Ordering::SeqCst) {
            let (sink, subscription) = store_api::channel();
            self.sinks.lock().push(sink);
            return Ok(subscription);
        }
        self.inner.subscribe(query).await
    }
}

pub async fn open_timeline(store: Arc<TestStore>, room_id: &str) -> RoomTimeline {
    RoomTimeline::open(store, EventChannel::new(), room_id, "General")
        .await
        .unwrap()
}

/// Next appended message, failing the test after two seconds.
pub async fn next_message(timeline: &mut RoomTimeline) -> ChatMessage {
    timeout(Duration::from_secs(2), timeline.next_update())
        .await
        .expect("update in time")
        .expect("timeline still live")
}

/// True if nothing is appended within a short grace period.
pub async fn stays_quiet(timeline: &mut RoomTimeline) -> bool {
    timeout(Duration::from_millis(150), timeline.next_update())
        .await
        .is_err()
}

pub async fn wait_for_listeners(store: &SqliteStore, n: usize) {
    timeout(Duration::from_secs(2), async {
        while store.active_listeners() != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener count settles");
}
