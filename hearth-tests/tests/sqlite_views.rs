use std::sync::Arc;

use futures_util::stream::StreamExt;
use hearth::{
    apply::ApplyEngine,
    codec::{Collection, Namespace, RoomOp},
    oplog::{Apply, LogHandle, Node},
    persistence::sqlite::{run_migrations, SqliteViewStore},
    proto::room::{Event, User},
    KeyRange, Mutation, Order, Query, Record, RoomUpdate, ViewStore, Views, WriterKey,
};
use prost::Message;
use serde_json::json;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::broadcast;

async fn test_db_pool() -> SqlitePool {
    // every connection to an in-memory database sees its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("../hearth/migrations")
        .run(&pool)
        .await
        .unwrap();
    pool
}

fn insert(collection: &str, key: &str, seq: u64) -> Mutation {
    Mutation::Insert {
        collection: collection.into(),
        record: Record::new(key.as_bytes(), seq, format!("{key}@{seq}").into_bytes()),
    }
}

async fn keys(store: &SqliteViewStore, collection: &str, query: Query) -> Vec<String> {
    let mut stream = store.find(collection, &query).await.unwrap();
    let mut keys = Vec::new();
    while let Some(record) = stream.next().await {
        keys.push(String::from_utf8(record.unwrap().key).unwrap());
    }
    keys
}

#[tokio::test]
async fn migrations_are_bundled() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    let store = SqliteViewStore::new(pool, "document");
    assert!(store.find_one("users", &Query::all()).await.unwrap().is_none());
}

#[tokio::test]
async fn commit_and_find() {
    let store = SqliteViewStore::new(test_db_pool().await, "event");
    store
        .commit(vec![
            insert("events", "b", 1),
            insert("events", "a", 2),
            insert("events", "c", 0),
            insert("other", "z", 3),
        ])
        .await
        .unwrap();

    assert_eq!(keys(&store, "events", Query::all()).await, vec!["a", "b", "c"]);
    assert_eq!(
        keys(&store, "events", Query::all().order(Order::Seq)).await,
        vec!["c", "b", "a"]
    );
    assert_eq!(
        keys(&store, "events", Query::all().order(Order::Seq).reverse(true).limit(2)).await,
        vec!["a", "b"]
    );
    let range = KeyRange {
        gte: Some(b"b".to_vec()),
        lt: Some(b"c".to_vec()),
        ..Default::default()
    };
    assert_eq!(keys(&store, "events", Query::all().range(range)).await, vec!["b"]);
    assert_eq!(keys(&store, "other", Query::all()).await, vec!["z"]);
}

#[tokio::test]
async fn upsert_and_delete() {
    let store = SqliteViewStore::new(test_db_pool().await, "document");
    store.commit(vec![insert("users", "u", 1)]).await.unwrap();
    store
        .commit(vec![
            insert("users", "u", 7),
            Mutation::Delete {
                collection: "users".into(),
                key: b"missing".to_vec(),
            },
        ])
        .await
        .unwrap();
    let record = store
        .find_one("users", &Query::key(*b"u"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.seq, 7);
    assert_eq!(record.value, b"u@7".to_vec());

    store
        .commit(vec![Mutation::Delete {
            collection: "users".into(),
            key: b"u".to_vec(),
        }])
        .await
        .unwrap();
    assert!(store.find_one("users", &Query::all()).await.unwrap().is_none());
}

#[tokio::test]
async fn scopes_share_a_pool() {
    let pool = test_db_pool().await;
    let document = SqliteViewStore::new(pool.clone(), "document");
    let event = SqliteViewStore::new(pool, "event");
    document.commit(vec![insert("items", "d", 0)]).await.unwrap();
    event.commit(vec![insert("items", "e", 0)]).await.unwrap();
    assert_eq!(keys(&document, "items", Query::all()).await, vec!["d"]);
    assert_eq!(keys(&event, "items", Query::all()).await, vec!["e"]);
}

#[tokio::test]
async fn apply_engine_on_sqlite() {
    let pool = test_db_pool().await;
    let views = Arc::new(Views::new(
        SqliteViewStore::new(pool.clone(), "document"),
        SqliteViewStore::new(pool, "event"),
    ));
    let namespace = Namespace::default();
    let (updates, mut rx) = broadcast::channel(16);
    let engine = ApplyEngine::new(&namespace, Arc::clone(&views), updates);

    let writer = WriterKey::generate();
    let ops = vec![
        RoomOp::AddUser(User::new("u1", &json!({"hello": "world"}))),
        RoomOp::AddEvent(Event::new("e1", &json!("first"))),
        RoomOp::AddEvent(Event::new("e2", &json!("second"))),
        RoomOp::DelEvent(Event::id_only("e1")),
    ];
    let nodes: Vec<Node> = ops
        .iter()
        .enumerate()
        .map(|(seq, op)| Node {
            seq: seq as u64,
            writer,
            value: op.encode(&namespace),
        })
        .collect();
    engine.apply(&nodes, &mut LogHandle::default()).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), RoomUpdate::Update);
    assert_eq!(rx.recv().await.unwrap(), RoomUpdate::NewEvent);

    let user = views
        .document
        .find_one(&namespace.collection(Collection::Users), &Query::key(*b"u1"))
        .await
        .unwrap()
        .unwrap();
    let user = User::decode(user.value.as_slice()).unwrap();
    assert_eq!(user.info_value().unwrap(), json!({"hello": "world"}));

    let events = views
        .event
        .collect(&namespace.collection(Collection::Events), &Query::all())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, b"e2".to_vec());
    assert_eq!(events[0].seq, 2);
}
