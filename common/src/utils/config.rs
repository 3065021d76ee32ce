use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::storage::vector::DistanceMetric;

/// Connection settings for one SurrealDB instance. The document store
/// and the vector store each get their own block so they can point at
/// different servers.
#[derive(Clone, Deserialize, Debug)]
pub struct StoreConfig {
    pub address: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Per-operation timeout for this store, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub document_store: StoreConfig,
    pub vector_store: StoreConfig,
    #[serde(default = "default_tenant")]
    pub default_tenant: String,
    pub http_port: u16,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    /// Distance metric for the vector index: "cosine" or "euclidean".
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
}

fn default_tenant() -> String {
    "default".to_string()
}

fn default_embedding_backend() -> String {
    "hashed".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_store_timeout_ms() -> u64 {
    10_000
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    /// A config suitable for in-memory tests: hashed embeddings with a
    /// small dimension and both stores pointing at `mem://`.
    pub fn for_tests() -> Self {
        let mem_store = StoreConfig {
            address: "mem://".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
            namespace: "test_ns".to_string(),
            database: uuid::Uuid::new_v4().to_string(),
            timeout_ms: default_store_timeout_ms(),
        };
        AppConfig {
            document_store: mem_store.clone(),
            vector_store: StoreConfig {
                database: uuid::Uuid::new_v4().to_string(),
                ..mem_store
            },
            default_tenant: default_tenant(),
            http_port: 0,
            embedding_backend: "hashed".to_string(),
            embedding_model: default_embedding_model(),
            embedding_dimension: 16,
            distance_metric: DistanceMetric::Cosine,
            openai_api_key: None,
            openai_base_url: default_base_url(),
        }
    }
}
