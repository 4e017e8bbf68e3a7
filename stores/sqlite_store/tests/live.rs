use std::time::Duration;

use sqlite_store::{SqliteStore, StoreOptions};
use store_api::{Direction, DocumentStore, FieldValue, Fields, Query, StoreError, Subscription};
use tokio::time::timeout;

fn message(room: &str, text: &str) -> Fields {
    Fields::from([
        ("roomId".to_string(), FieldValue::from(room)),
        ("message".to_string(), FieldValue::from(text)),
        ("createdAt".to_string(), FieldValue::ServerTimestamp),
    ])
}

fn tail(room: &str, after: time::OffsetDateTime) -> Query {
    Query::collection("messages")
        .where_eq("roomId", room)
        .where_gt("createdAt", after)
        .order_by("createdAt", Direction::Descending)
        .limit(1)
}

async fn next_texts(sub: &mut Subscription) -> Vec<String> {
    let snapshot = timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("notification in time")
        .expect("subscription open")
        .expect("no error");
    snapshot
        .iter()
        .map(|d| d.str_field("message").unwrap().to_string())
        .collect()
}

async fn wait_for_listeners(store: &SqliteStore, n: usize) {
    timeout(Duration::from_secs(2), async {
        while store.active_listeners() != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener count settles");
}

#[tokio::test]
async fn server_timestamps_are_assigned_and_increasing() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = store.create("messages", None, message("r", "a")).await.unwrap();
    let b = store.create("messages", None, message("r", "b")).await.unwrap();
    let ta = a.timestamp_field("createdAt").unwrap();
    let tb = b.timestamp_field("createdAt").unwrap();
    assert!(tb > ta);
    assert_ne!(a.id, b.id);

    let all = store
        .query(&Query::collection("messages").order_by("createdAt", Direction::Ascending))
        .await
        .unwrap();
    assert_eq!(all, vec![a, b]);
}

#[tokio::test]
async fn explicit_ids_are_kept() {
    let store = SqliteStore::open_in_memory().unwrap();
    let fields = Fields::from([("name".to_string(), FieldValue::from("General"))]);
    let doc = store
        .create("rooms", Some("room-1".into()), fields)
        .await
        .unwrap();
    assert_eq!(doc.id, "room-1");
    let rooms = store.query(&Query::collection("rooms")).await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].str_field("name"), Some("General"));
}

#[tokio::test]
async fn tail_listener_delivers_each_new_message() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mark = time::OffsetDateTime::now_utc();
    let mut sub = store.subscribe(&tail("r", mark)).await.unwrap();
    assert!(next_texts(&mut sub).await.is_empty());

    // Back-to-back writes each get their own notification despite limit 1.
    store.create("messages", None, message("r", "one")).await.unwrap();
    store.create("messages", None, message("other", "x")).await.unwrap();
    store.create("messages", None, message("r", "two")).await.unwrap();
    assert_eq!(next_texts(&mut sub).await, ["one"]);
    assert_eq!(next_texts(&mut sub).await, ["two"]);
}

#[tokio::test]
async fn initial_snapshot_covers_earlier_writes() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mark = time::OffsetDateTime::now_utc();
    store.create("messages", None, message("r", "early")).await.unwrap();
    let mut sub = store.subscribe(&tail("r", mark)).await.unwrap();
    assert_eq!(next_texts(&mut sub).await, ["early"]);
}

#[tokio::test]
async fn cancelled_listener_is_released() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut sub = store
        .subscribe(&Query::collection("rooms"))
        .await
        .unwrap();
    assert_eq!(store.active_listeners(), 1);
    sub.cancel();
    wait_for_listeners(&store, 0).await;

    let dropped = store
        .subscribe(&Query::collection("rooms"))
        .await
        .unwrap();
    drop(dropped);
    wait_for_listeners(&store, 0).await;
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn file_store_sees_commits_from_other_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.db");
    let options = StoreOptions {
        poll_interval: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let reader = SqliteStore::open(&path, options.clone()).unwrap();
    let writer = SqliteStore::open(&path, options).unwrap();

    let mark = time::OffsetDateTime::now_utc();
    let mut sub = reader.subscribe(&tail("r", mark)).await.unwrap();
    assert!(next_texts(&mut sub).await.is_empty());

    writer.create("messages", None, message("r", "hello")).await.unwrap();
    assert_eq!(next_texts(&mut sub).await, ["hello"]);
}

#[tokio::test]
async fn rewriting_an_id_requeries_the_listener() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut sub = store.subscribe(&Query::collection("rooms")).await.unwrap();
    assert!(sub.next().await.unwrap().unwrap().is_empty());

    let named = |name: &str| Fields::from([("name".to_string(), FieldValue::from(name))]);
    store
        .create("rooms", Some("room-1".into()), named("Before"))
        .await
        .unwrap();
    let snapshot = sub.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].str_field("name"), Some("Before"));

    store
        .create("rooms", Some("room-1".into()), named("After"))
        .await
        .unwrap();
    let snapshot = timeout(Duration::from_secs(2), sub.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "room-1");
    assert_eq!(snapshot[0].str_field("name"), Some("After"));
}

#[tokio::test]
async fn lagging_listener_reports_and_catches_up() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(
        dir.path().join("chat.db"),
        StoreOptions {
            poll_interval: None,
            change_capacity: 1,
        },
    )
    .unwrap();
    let newest = Query::collection("messages")
        .order_by("createdAt", Direction::Descending)
        .limit(1);
    let mut sub = store.subscribe(&newest).await.unwrap();
    assert!(sub.next().await.unwrap().unwrap().is_empty());

    // Write from another runtime while this test's single thread is parked,
    // so the listener cannot drain the feed in between.
    let writer = store.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            for i in 0..30 {
                writer
                    .create("messages", None, message("r", &format!("m{i}")))
                    .await
                    .unwrap();
            }
        });
    })
    .join()
    .unwrap();
    let expected = store.query(&newest).await.unwrap().remove(0);

    let mut lagged = false;
    loop {
        let notification = timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("notification in time")
            .expect("subscription open");
        match notification {
            Ok(snapshot) if snapshot.first().map(|d| &d.id) == Some(&expected.id) => break,
            Ok(_) => {}
            Err(StoreError::Subscription(_)) => lagged = true,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert!(lagged);
    assert!(!sub.is_cancelled());
}
