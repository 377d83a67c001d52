//! Walk through the cache protocol with the in-memory backends
//!
//! Shows cold reads, write locks, negative caching and a reader losing the
//! write-back race to a concurrent writer.
//!
//! Run the example:
//! ```bash
//! RUST_LOG=ouroboros_nds=debug cargo run --example consistency_demo
//! ```

use ouroboros_nds::{
    cache_key, impl_struct_entity, ItemState, Key, MemoryCache, MemoryDatastore, Nds, NdsError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Task {
    title: String,
    status: String,
}

impl_struct_entity!(Task);

async fn show_slot(nds: &Nds<MemoryDatastore, MemoryCache>, key: &Key) {
    let state = nds
        .cache()
        .peek(&cache_key(key))
        .await
        .map(|item| format!("{:?}", item.state()))
        .unwrap_or_else(|| "empty".to_string());
    println!("  cache slot for {}: {}", key, state);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ouroboros_nds=info")),
        )
        .init();

    ouroboros_nds::init();

    let store = MemoryDatastore::new().with_read_latency(Duration::from_millis(100));
    let nds = Arc::new(Nds::new(Arc::new(store), Arc::new(MemoryCache::default())));
    let key = Key::named("Task", "task-001");

    println!("=== Write ===");
    nds.put(
        &key,
        Task {
            title: "Setup database".to_string(),
            status: "pending".to_string(),
        },
    )
    .await?;
    show_slot(&nds, &key).await;

    println!("\n=== Read (repopulates the cache) ===");
    let task: Task = nds.get(&key).await?;
    println!("  loaded: {:?}", task);
    show_slot(&nds, &key).await;

    println!("\n=== Read racing a write ===");
    nds.put(
        &key,
        Task {
            title: "Setup database".to_string(),
            status: "running".to_string(),
        },
    )
    .await?;
    let reader = {
        let nds = Arc::clone(&nds);
        let key = key.clone();
        tokio::spawn(async move { nds.get::<Task>(&key).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    nds.put(
        &key,
        Task {
            title: "Setup database".to_string(),
            status: "done".to_string(),
        },
    )
    .await?;
    match reader.await? {
        Ok(task) => println!("  racing reader saw: {:?}", task),
        Err(e) => println!("  racing reader saw: {}", e),
    }
    show_slot(&nds, &key).await;

    let task: Task = nds.get(&key).await?;
    println!("  next reader saw: {:?}", task);
    show_slot(&nds, &key).await;

    println!("\n=== Missing records are cached too ===");
    let missing = Key::named("Task", "task-404");
    for _ in 0..2 {
        match nds.get::<Task>(&missing).await {
            Err(NdsError::NotFound) => println!("  {} not found", missing),
            other => println!("  unexpected: {:?}", other.map(|t| t.title)),
        }
    }
    show_slot(&nds, &missing).await;

    let slot = nds.cache().peek(&cache_key(&missing)).await;
    assert_eq!(slot.map(|item| item.state()), Some(ItemState::None));

    println!("\nStore calls: {:?}", nds.store().stats().await);
    println!("Cache: {}", nds.cache().stats().await);
    Ok(())
}
