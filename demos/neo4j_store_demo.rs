//! Use Neo4j as the authoritative store behind the cache
//!
//! ## Usage
//!
//! Set environment variables (optional, or use a `.env` file):
//! ```bash
//! export NEO4J_URI="bolt://localhost:7687"
//! export NEO4J_USER="neo4j"
//! export NEO4J_PASSWORD="password"
//! export NEO4J_DATABASE="neo4j"
//! ```
//!
//! Run the example:
//! ```bash
//! cargo run --example neo4j_store_demo
//! ```

use ouroboros_nds::{impl_struct_entity, Key, MemoryCache, Neo4jDatastore, Nds, StoreConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
struct Task {
    title: String,
    description: String,
    tags: Vec<String>,
}

impl_struct_entity!(Task);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("ouroboros_nds=debug,neo4j_store_demo=info")
        .init();

    ouroboros_nds::init();

    let config = StoreConfig::from_env();
    println!("Connecting to Neo4j:");
    println!("  URI: {}", config.uri);
    println!("  User: {}", config.user);
    println!("  Database: {}\n", config.database);

    let store = match Neo4jDatastore::connect(config).await {
        Ok(store) => {
            println!("✓ Successfully connected to Neo4j");
            store
        }
        Err(e) => {
            println!("✗ Failed to connect: {}", e);
            println!("Please ensure Neo4j is running and credentials are correct.");
            return Err(e.into());
        }
    };

    match store.health_check_ping().await {
        Ok(true) => println!("✓ db.ping() succeeded\n"),
        Ok(false) => println!("✗ db.ping() reported failure\n"),
        Err(e) => {
            println!("db.ping() unavailable ({}), trying RETURN 1", e);
            store.health_check().await?;
            println!("✓ RETURN 1 succeeded\n");
        }
    }

    let nds = Nds::new(Arc::new(store), Arc::new(MemoryCache::default()));

    let keys = vec![Key::named("Task", "task-001"), Key::named("Task", "task-002")];
    let tasks = vec![
        Task {
            title: "Setup database".to_string(),
            description: "Initialize Neo4j database".to_string(),
            tags: vec!["infra".to_string()],
        },
        Task {
            title: "Load data".to_string(),
            description: "Load initial data".to_string(),
            tags: vec!["data".to_string(), "etl".to_string()],
        },
    ];

    for result in nds.put_multi(&keys, &tasks).await? {
        println!("Stored {}", result?);
    }

    // First read loads from Neo4j, second is served by the cache
    for round in 1..=2 {
        for (key, task) in keys.iter().zip(nds.get_multi::<Task>(&keys).await?) {
            println!("Round {}: {} -> {:?}", round, key, task?);
        }
    }
    println!("Cache: {}", nds.cache().stats().await);

    nds.delete_multi(&keys).await?;
    println!("Deleted {} tasks", keys.len());
    Ok(())
}
