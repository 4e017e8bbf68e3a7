//! Document store backed by SQLite.
//!
//! Documents are kept as JSON rows; filtering, ordering and limits run through
//! [`Query::apply`] so one-shot queries and live listeners agree exactly.
//! Every write is announced on an in-process broadcast feed, and file-backed
//! stores additionally watch for commits made by other processes.

pub mod db;

mod clock;
mod listener;
mod watcher;

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use store_api::{
    resolve_server_timestamps, Document, DocumentStore, Fields, Query, StoreError, Subscription,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clock::ServerClock,
    listener::{Listener, ListenerGuard},
    watcher::Watch,
};

/// Change announced to live listeners.
#[derive(Debug, Clone)]
pub(crate) enum StoreChange {
    Created {
        collection: String,
        document: Document,
        replaced: bool,
    },
    /// Another process committed; listeners must re-run their query.
    External,
}

/// Tuning knobs for [`SqliteStore::open`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How often to check the database file for foreign commits. `None`
    /// disables the check.
    pub poll_interval: Option<Duration>,
    /// Buffered changes per listener before it lags.
    pub change_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            poll_interval: Some(Duration::from_millis(500)),
            change_capacity: 256,
        }
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

struct Inner {
    pool: Pool<SqliteConnectionManager>,
    changes: broadcast::Sender<StoreChange>,
    write_lock: Arc<Mutex<ServerClock>>,
    listeners: Arc<AtomicUsize>,
    watch: Option<Arc<Watch>>,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn unavailable(err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), StoreError> {
    let conn = pool.get().map_err(unavailable)?;
    db::migrate(&conn).map_err(|err| unavailable(format!("{err:#}")))
}

impl SqliteStore {
    /// Open (or create) a database file. Must be called from within a tokio
    /// runtime when a poll interval is set.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(unavailable)?;
            }
        }
        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        });
        let pool = Pool::new(manager).map_err(unavailable)?;
        migrate(&pool)?;
        let watch = match options.poll_interval {
            Some(_) => Some(Arc::new(
                Watch::open(&path).map_err(|err| unavailable(format!("{err:#}")))?,
            )),
            None => None,
        };
        let store = Self::from_pool(pool, options.change_capacity, watch.clone());
        if let (Some(every), Some(watch)) = (options.poll_interval, watch) {
            watcher::spawn(
                path.clone(),
                every,
                watch,
                store.inner.changes.clone(),
                store.inner.write_lock.clone(),
                store.inner.shutdown.clone(),
            );
        }
        info!("opened document store at {}", path.display());
        Ok(store)
    }

    /// A private store that lives as long as the returned handle.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        // Every in-memory connection is its own database, so keep exactly one
        // alive for the lifetime of the pool.
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(SqliteConnectionManager::memory())
            .map_err(unavailable)?;
        migrate(&pool)?;
        Ok(Self::from_pool(
            pool,
            StoreOptions::default().change_capacity,
            None,
        ))
    }

    fn from_pool(
        pool: Pool<SqliteConnectionManager>,
        change_capacity: usize,
        watch: Option<Arc<Watch>>,
    ) -> Self {
        let (changes, _) = broadcast::channel(change_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                pool,
                changes,
                write_lock: Arc::new(Mutex::new(ServerClock::default())),
                listeners: Arc::new(AtomicUsize::new(0)),
                watch,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Number of live listeners that have not been released yet.
    pub fn active_listeners(&self) -> usize {
        self.inner.listeners.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn write(
        &self,
        collection: String,
        id: String,
        mut fields: Fields,
    ) -> Result<Document, StoreError> {
        let conn = self.pool.get().map_err(unavailable)?;
        // Stamping, committing and announcing under one lock keeps the feed in
        // timestamp order.
        let mut clock = self.write_lock.lock();
        // A commit from elsewhere that the watcher has not reported yet must
        // survive our own commit being absorbed below.
        let foreign = match self.watch.as_deref() {
            Some(watch) => watch.sample().map_or(true, |v| v != watch.seen()),
            None => false,
        };
        resolve_server_timestamps(&mut fields, clock.tick());
        let document = Document::new(id, fields);
        let replaced = db::upsert_document(&conn, &collection, &document)
            .map_err(|err| unavailable(format!("{err:#}")))?;
        debug!(collection = %collection, id = %document.id, replaced, "document written");
        let _ = self.changes.send(StoreChange::Created {
            collection,
            document: document.clone(),
            replaced,
        });
        if let Some(watch) = self.watch.as_deref() {
            match watch.sample() {
                Ok(version) => {
                    if foreign {
                        let _ = self.changes.send(StoreChange::External);
                    }
                    watch.absorb(version);
                }
                Err(err) => warn!("data_version sample failed: {err:#}"),
            }
        }
        Ok(document)
    }
}

pub(crate) async fn run_query(
    pool: Pool<SqliteConnectionManager>,
    query: Query,
) -> Result<Vec<Document>, StoreError> {
    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(unavailable)?;
        let docs = db::load_collection(&conn, query.collection_name())
            .map_err(|err| unavailable(format!("{err:#}")))?;
        Ok(query.apply(docs))
    })
    .await
    .map_err(unavailable)?
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create(
        &self,
        collection: &str,
        id: Option<String>,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        let inner = self.inner.clone();
        let collection = collection.to_string();
        let id = id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        tokio::task::spawn_blocking(move || inner.write(collection, id, fields))
            .await
            .map_err(unavailable)?
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        run_query(self.inner.pool.clone(), query.clone()).await
    }

    async fn subscribe(&self, query: &Query) -> Result<Subscription, StoreError> {
        let (sink, subscription) = store_api::channel();
        // Subscribe to the feed before the first query runs so no write can
        // fall between the initial snapshot and the first change.
        let listener = Listener {
            pool: self.inner.pool.clone(),
            query: query.clone(),
            sink,
            changes: self.inner.changes.subscribe(),
            guard: ListenerGuard::new(self.inner.listeners.clone()),
        };
        listener.spawn();
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(feed: &mut broadcast::Receiver<StoreChange>) -> (usize, usize) {
        let (mut created, mut external) = (0, 0);
        while let Ok(change) = feed.try_recv() {
            match change {
                StoreChange::Created { .. } => created += 1,
                StoreChange::External => external += 1,
            }
        }
        (created, external)
    }

    #[tokio::test]
    async fn only_foreign_commits_are_external() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let store = SqliteStore::open(
            &path,
            StoreOptions {
                poll_interval: Some(Duration::from_millis(10)),
                ..Default::default()
            },
        )
        .unwrap();
        let mut feed = store.inner.changes.subscribe();

        for _ in 0..5 {
            store.create("rooms", None, Fields::new()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(drain(&mut feed), (5, 0));

        let other = SqliteStore::open(
            &path,
            StoreOptions {
                poll_interval: None,
                ..Default::default()
            },
        )
        .unwrap();
        other.create("rooms", None, Fields::new()).await.unwrap();
        let change = tokio::time::timeout(Duration::from_secs(2), feed.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(change, StoreChange::External));
        assert_eq!(drain(&mut feed).0, 0);
    }
}
