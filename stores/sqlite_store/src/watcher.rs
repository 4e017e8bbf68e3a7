use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::Connection;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{clock::ServerClock, db, StoreChange};

/// `PRAGMA data_version` as seen from a dedicated connection. The counter
/// moves on commits from every other connection, including this store's own
/// pool, so local writes record their version here and only the remainder
/// counts as foreign.
pub(crate) struct Watch {
    conn: Mutex<Connection>,
    seen: AtomicI64,
}

impl Watch {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let seen = db::data_version(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            seen: AtomicI64::new(seen),
        })
    }

    pub(crate) fn sample(&self) -> Result<i64> {
        db::data_version(&self.conn.lock())
    }

    /// Last version accounted for.
    pub(crate) fn seen(&self) -> i64 {
        self.seen.load(Ordering::SeqCst)
    }

    /// Record `version` as accounted for. Callers hold the store write lock.
    pub(crate) fn absorb(&self, version: i64) {
        self.seen.store(version, Ordering::SeqCst);
    }
}

/// Poll the watch on an interval so listeners notice commits made by other
/// processes sharing the database file.
pub(crate) fn spawn(
    path: PathBuf,
    every: Duration,
    watch: Arc<Watch>,
    changes: broadcast::Sender<StoreChange>,
    write_lock: Arc<Mutex<ServerClock>>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }
            let watch = watch.clone();
            let lock = write_lock.clone();
            let changes = changes.clone();
            // Local writes sample and absorb under the same lock, so whatever
            // moved in between came from elsewhere.
            let res = tokio::task::spawn_blocking(move || {
                let _writes = lock.lock();
                let version = watch.sample()?;
                let changed = version != watch.seen();
                if changed {
                    let _ = changes.send(StoreChange::External);
                    watch.absorb(version);
                }
                anyhow::Ok(changed.then_some(version))
            })
            .await;
            match res {
                Ok(Ok(Some(version))) => debug!(version, "database changed on disk"),
                Ok(Ok(None)) => {}
                Ok(Err(err)) => warn!("data_version poll failed: {err:#}"),
                Err(err) => warn!("data_version poll aborted: {err}"),
            }
        }
        debug!("change watcher for {} stopped", path.display());
    });
}
