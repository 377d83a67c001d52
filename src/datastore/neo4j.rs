//! Neo4j-backed authoritative store
//!
//! Each record is a `(:NdsEntity {key, payload})` node: `key` is the stable
//! key encoding and `payload` the base64 form of the codec bytes. Batches run
//! as single `UNWIND` queries.

use crate::codec::{BincodeCodec, RecordCodec};
use crate::datastore::Datastore;
use crate::error::{NdsError, Result};
use crate::key::{Key, KeyId};
use crate::property::PropertyList;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use neo4rs::{query, ConfigBuilder, Graph};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const GET_QUERY: &str = "UNWIND $keys AS k \
     OPTIONAL MATCH (e:NdsEntity {key: k}) \
     RETURN k, e.payload AS payload";

const PUT_QUERY: &str = "UNWIND range(0, size($keys) - 1) AS i \
     MERGE (e:NdsEntity {key: $keys[i]}) \
     SET e.payload = $payloads[i]";

const DELETE_QUERY: &str = "UNWIND $keys AS k \
     MATCH (e:NdsEntity {key: k}) \
     DETACH DELETE e";

/// Connection settings for [`Neo4jDatastore`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection URI (e.g., "bolt://localhost:7687")
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,

    /// Connection pool size
    pub max_connections: usize,

    /// Rows fetched per round trip
    pub fetch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            max_connections: 16,
            fetch_size: 500,
        }
    }
}

impl StoreConfig {
    /// Read `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD` and `NEO4J_DATABASE`,
    /// loading a `.env` file first if one exists
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            uri: lookup("NEO4J_URI").unwrap_or(defaults.uri),
            user: lookup("NEO4J_USER").unwrap_or(defaults.user),
            password: lookup("NEO4J_PASSWORD").unwrap_or(defaults.password),
            database: lookup("NEO4J_DATABASE").unwrap_or(defaults.database),
            ..defaults
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(NdsError::Config("uri must not be empty".to_string()));
        }
        if self.database.is_empty() {
            return Err(NdsError::Config("database must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(NdsError::Config("max_connections must be > 0".to_string()));
        }
        if self.fetch_size == 0 {
            return Err(NdsError::Config("fetch_size must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Authoritative store persisted in Neo4j
pub struct Neo4jDatastore {
    graph: Graph,
    codec: Arc<dyn RecordCodec>,
}

impl Neo4jDatastore {
    /// Connect using the default record codec
    ///
    /// # Example
    /// ```no_run
    /// use ouroboros_nds::datastore::{Neo4jDatastore, StoreConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     ouroboros_nds::init();
    ///     let store = Neo4jDatastore::connect(StoreConfig::from_env()).await?;
    ///     store.health_check().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        Self::connect_with_codec(config, Arc::new(BincodeCodec::new())).await
    }

    /// Connect with a custom record codec
    pub async fn connect_with_codec(
        config: StoreConfig,
        codec: Arc<dyn RecordCodec>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Connecting to Neo4j at {} (database: {})",
            config.uri, config.database
        );

        let neo4j_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .fetch_size(config.fetch_size)
            .max_connections(config.max_connections)
            .build()
            .map_err(|e| NdsError::Config(e.to_string()))?;

        let graph = Graph::connect(neo4j_config)
            .await
            .map_err(|e| NdsError::Connection(e.to_string()))?;

        info!("Successfully connected to Neo4j");
        Ok(Self { graph, codec })
    }

    /// Simple health check using RETURN 1
    pub async fn health_check(&self) -> Result<bool> {
        debug!("Executing simple health check (RETURN 1)");

        self.graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| NdsError::Connection(e.to_string()))?;

        debug!("Simple health check passed");
        Ok(true)
    }

    /// Health check using CALL db.ping() (Neo4j 4.1+)
    pub async fn health_check_ping(&self) -> Result<bool> {
        debug!("Executing standard health check (CALL db.ping())");

        let mut result = self
            .graph
            .execute(query("CALL db.ping()"))
            .await
            .map_err(|e| NdsError::Query(e.to_string()))?;

        match result.next().await.map_err(|e| NdsError::Query(e.to_string()))? {
            Some(row) => {
                let success: bool = row.get("success").unwrap_or(false);
                if !success {
                    warn!("Standard health check returned success=false");
                }
                Ok(success)
            }
            None => {
                error!("Standard health check returned no results");
                Err(NdsError::Query("No result returned from db.ping()".to_string()))
            }
        }
    }

    /// Get a reference to the underlying Neo4j Graph instance
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    fn decode_payload(&self, payload: &str) -> Result<PropertyList> {
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| NdsError::Decoding(e.to_string()))?;
        self.codec.unmarshal(&bytes)
    }
}

#[async_trait]
impl Datastore for Neo4jDatastore {
    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<Result<PropertyList>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let encoded: Vec<String> = keys.iter().map(Key::encode).collect();
        let mut rows = self
            .graph
            .execute(query(GET_QUERY).param("keys", encoded.clone()))
            .await
            .map_err(|e| NdsError::Query(e.to_string()))?;

        let mut payloads: HashMap<String, String> = HashMap::with_capacity(keys.len());
        while let Some(row) = rows.next().await.map_err(|e| NdsError::Query(e.to_string()))? {
            let key: String = row.get("k").map_err(|e| NdsError::Query(e.to_string()))?;
            let payload: Option<String> = row
                .get("payload")
                .map_err(|e| NdsError::Query(e.to_string()))?;
            if let Some(payload) = payload {
                payloads.insert(key, payload);
            }
        }

        debug!("Loaded {}/{} records from Neo4j", payloads.len(), keys.len());
        Ok(encoded
            .iter()
            .map(|key| match payloads.get(key) {
                Some(payload) => self.decode_payload(payload),
                None => Err(NdsError::NotFound),
            })
            .collect())
    }

    async fn put_multi(&self, keys: &[Key], records: &[PropertyList]) -> Result<Vec<Result<Key>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        if keys.len() != records.len() {
            return Err(NdsError::LengthMismatch {
                keys: keys.len(),
                values: records.len(),
            });
        }

        let completed: Vec<Key> = {
            let mut rng = rand::thread_rng();
            keys.iter()
                .map(|key| {
                    if key.is_incomplete() {
                        key.complete(KeyId::Int(rng.gen_range(1..i64::MAX)))
                    } else {
                        key.clone()
                    }
                })
                .collect()
        };

        let mut encoded = Vec::with_capacity(keys.len());
        let mut payloads = Vec::with_capacity(keys.len());
        for (key, record) in completed.iter().zip(records) {
            encoded.push(key.encode());
            payloads.push(STANDARD.encode(self.codec.marshal(record)?));
        }

        self.graph
            .run(
                query(PUT_QUERY)
                    .param("keys", encoded)
                    .param("payloads", payloads),
            )
            .await
            .map_err(|e| NdsError::Query(e.to_string()))?;

        debug!("Stored {} records in Neo4j", keys.len());
        Ok(completed.into_iter().map(Ok).collect())
    }

    async fn delete_multi(&self, keys: &[Key]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let encoded: Vec<String> = keys.iter().map(Key::encode).collect();
        self.graph
            .run(query(DELETE_QUERY).param("keys", encoded))
            .await
            .map_err(|e| NdsError::Query(e.to_string()))?;

        debug!("Deleted {} records from Neo4j", keys.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_store_config() {
        let config = StoreConfig::default();

        assert_eq!(config.uri, "bolt://localhost:7687");
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.database, "neo4j");
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.fetch_size, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = StoreConfig::from_lookup(|name| match name {
            "NEO4J_URI" => Some("bolt://db.internal:7687".to_string()),
            "NEO4J_DATABASE" => Some("records".to_string()),
            _ => None,
        });

        assert_eq!(config.uri, "bolt://db.internal:7687");
        assert_eq!(config.database, "records");
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.password, "password");
    }

    #[test]
    fn test_invalid_store_config() {
        let config = StoreConfig {
            max_connections: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(NdsError::Config(_))));

        let config = StoreConfig {
            uri: String::new(),
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
