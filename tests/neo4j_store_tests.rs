//! Neo4j-backed store tests
//!
//! Require a running Neo4j instance. Connection settings come from the
//! environment (`NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD`,
//! `NEO4J_DATABASE`) or a `.env` file.
//!
//! Run with: cargo test --test neo4j_store_tests -- --ignored

use ouroboros_nds::{
    Datastore, Key, MemoryCache, Neo4jDatastore, Nds, NdsError, PropertyList, PropertyValue,
    StoreConfig,
};
use std::sync::Arc;

async fn connect() -> Neo4jDatastore {
    ouroboros_nds::init();
    Neo4jDatastore::connect(StoreConfig::from_env())
        .await
        .expect("Failed to connect to Neo4j")
}

fn unique_key(label: &str) -> Key {
    Key::named("NdsTest", format!("{}-{}", label, chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)))
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_checks() {
    let store = connect().await;

    assert!(store.health_check().await.unwrap());
    assert!(store.health_check_ping().await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_store_round_trip() {
    let store = connect().await;
    let key = unique_key("round-trip");
    let record = PropertyList::new()
        .with("title", PropertyValue::String("Setup database".to_string()))
        .with("priority", PropertyValue::Int(1));

    let stored = store.put_multi(&[key.clone()], &[record.clone()]).await.unwrap();
    assert_eq!(stored[0].as_ref().unwrap(), &key);

    let loaded = store.get_multi(&[key.clone()]).await.unwrap();
    assert_eq!(loaded[0].as_ref().unwrap(), &record);

    store.delete_multi(&[key.clone()]).await.unwrap();
    store.delete_multi(&[key.clone()]).await.unwrap();

    let loaded = store.get_multi(&[key]).await.unwrap();
    assert!(matches!(loaded[0], Err(NdsError::NotFound)));
}

#[tokio::test]
#[ignore]
async fn test_incomplete_keys_are_completed() {
    let store = connect().await;
    let record = PropertyList::new().with("n", PropertyValue::Int(1));

    let stored = store
        .put_multi(&[Key::incomplete("NdsTest")], &[record])
        .await
        .unwrap();
    let key = stored[0].as_ref().unwrap().clone();
    assert!(!key.is_incomplete());

    store.delete_multi(&[key]).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_orchestrator_over_neo4j() {
    let nds = Nds::new(Arc::new(connect().await), Arc::new(MemoryCache::default()));
    let key = unique_key("orchestrated");

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Note {
        text: String,
    }
    ouroboros_nds::impl_struct_entity!(Note);

    nds.put(&key, Note { text: "hello".to_string() }).await.unwrap();
    let note: Note = nds.get(&key).await.unwrap();
    assert_eq!(note.text, "hello");

    nds.delete(&key).await.unwrap();
    assert!(matches!(nds.get::<Note>(&key).await, Err(NdsError::NotFound)));
}
