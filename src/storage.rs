//! # Storage Management Module
//!
//! ## Purpose
//! Persistence for case documents and run journals behind a small document
//! store abstraction: named collections of JSON documents addressed by a
//! string id. The engine only ever talks to the trait, so the embedded sled
//! backend and the in-memory backend used by tests and demos are fully
//! interchangeable.
//!
//! ## Input/Output Specification
//! - **Input**: JSON documents keyed by `(collection, id)`
//! - **Output**: Stored documents, full-collection listings, statistics
//! - **Storage**: Sled embedded database, one tree per collection
//!
//! ## Key Features
//! - Upsert/get/delete plus whole-collection listing
//! - Optional gzip compression of stored documents
//! - Write/read/remove health check
//! - Undecodable documents are skipped with a warning instead of failing
//!   the whole listing

use crate::config::StorageConfig;
use crate::errors::{RegistryError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A schemaless JSON document, the unit of storage.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_documents: usize,
    pub collections: usize,
    pub database_size_bytes: u64,
    pub backend: String,
}

impl Default for StorageStats {
    fn default() -> Self {
        Self {
            total_documents: 0,
            collections: 0,
            database_size_bytes: 0,
            backend: "unknown".to_string(),
        }
    }
}

/// Document store abstraction the engine is written against.
///
/// Ids are caller-chosen strings; for cases the id is the slug. `list_all`
/// returns `(id, document)` pairs rather than bare documents because the id
/// a document lives under and the slug it claims can disagree in drifted
/// legacy data, and the engine needs to see both.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lists every document in a collection.
    async fn list_all(&self, collection: &str) -> Result<Vec<(String, Document)>>;

    /// Fetches one document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Creates or replaces one document.
    async fn upsert(&self, collection: &str, id: &str, document: Document) -> Result<()>;

    /// Removes one document. Removing an id that does not exist is not an
    /// error.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Verifies the backend is usable; the default assumes an always-healthy store.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats::default())
    }

    /// Flushes buffered writes; a no-op for unbuffered backends.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Sled-backed document store, one tree per collection.
pub struct SledDocumentStore {
    config: StorageConfig,
    db: sled::Db,
    trees: parking_lot::RwLock<HashMap<String, sled::Tree>>,
}

impl SledDocumentStore {
    /// Opens (or creates) the database at the configured path.
    pub async fn new(config: StorageConfig) -> Result<Self> {
        // Ensure database directory exists
        if let Some(parent) = config.db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = sled::open(&config.db_path).map_err(|e| RegistryError::DatabaseConnectionFailed {
            db_path: config.db_path.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(db_path = %config.db_path.display(), "storage initialized");

        Ok(Self {
            config,
            db,
            trees: parking_lot::RwLock::new(HashMap::new()),
        })
    }

    fn tree(&self, collection: &str) -> Result<sled::Tree> {
        if let Some(tree) = self.trees.read().get(collection) {
            return Ok(tree.clone());
        }
        let tree = self
            .db
            .open_tree(collection)
            .map_err(|e| RegistryError::DatabaseConnectionFailed {
                db_path: self.config.db_path.to_string_lossy().to_string(),
                reason: format!("Failed to open tree '{}': {}", collection, e),
            })?;
        self.trees.write().insert(collection.to_string(), tree.clone());
        Ok(tree)
    }

    fn encode(&self, document: &Document) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(document).map_err(|e| RegistryError::Serialization {
            context: "document".to_string(),
            reason: e.to_string(),
        })?;

        if self.config.enable_compression {
            use std::io::Write;

            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(&json)
                .map_err(|e| crate::internal_error!("Compression failed: {}", e))?;
            encoder
                .finish()
                .map_err(|e| crate::internal_error!("Compression finish failed: {}", e))
        } else {
            Ok(json)
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        let json: Vec<u8> = if self.config.enable_compression {
            use std::io::Read;

            let mut decoder = flate2::read::GzDecoder::new(bytes);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed).map_err(|e| {
                RegistryError::StorageCorrupted {
                    location: self.config.db_path.to_string_lossy().to_string(),
                    details: format!("Decompression failed: {}", e),
                }
            })?;
            decompressed
        } else {
            bytes.to_vec()
        };

        serde_json::from_slice(&json).map_err(|e| RegistryError::StorageCorrupted {
            location: self.config.db_path.to_string_lossy().to_string(),
            details: format!("Document decode failed: {}", e),
        })
    }
}

#[async_trait]
impl DocumentStore for SledDocumentStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<(String, Document)>> {
        let tree = self.tree(collection)?;
        let mut documents = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (key, value) = entry.map_err(|e| RegistryError::StoreList {
                collection: collection.to_string(),
                reason: e.to_string(),
            })?;
            let id = String::from_utf8_lossy(&key).to_string();
            match self.decode(&value) {
                Ok(document) => documents.push((id, document)),
                Err(e) => {
                    tracing::warn!(collection, id = %id, error = %e, "skipping undecodable document");
                }
            }
        }
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let tree = self.tree(collection)?;
        let value = tree.get(id.as_bytes()).map_err(|e| RegistryError::StoreRead {
            key: format!("{}/{}", collection, id),
            reason: e.to_string(),
        })?;
        match value {
            Some(bytes) => Ok(Some(self.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, collection: &str, id: &str, document: Document) -> Result<()> {
        let tree = self.tree(collection)?;
        let bytes = self.encode(&document)?;
        tree.insert(id.as_bytes(), bytes).map_err(|e| RegistryError::StoreWrite {
            key: format!("{}/{}", collection, id),
            reason: e.to_string(),
        })?;
        tracing::debug!(collection, id, "stored document");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let tree = self.tree(collection)?;
        tree.remove(id.as_bytes()).map_err(|e| RegistryError::StoreDelete {
            key: format!("{}/{}", collection, id),
            reason: e.to_string(),
        })?;
        tracing::debug!(collection, id, "deleted document");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let tree = self.tree("health")?;
        let test_key = b"health_check";
        let test_value = b"ok";

        // Test write
        tree.insert(test_key, test_value)
            .map_err(|e| RegistryError::DatabaseConnectionFailed {
                db_path: self.config.db_path.to_string_lossy().to_string(),
                reason: format!("Health check write failed: {}", e),
            })?;

        // Test read
        let result = tree
            .get(test_key)
            .map_err(|e| RegistryError::DatabaseConnectionFailed {
                db_path: self.config.db_path.to_string_lossy().to_string(),
                reason: format!("Health check read failed: {}", e),
            })?;

        if result.is_none() {
            return Err(RegistryError::DatabaseConnectionFailed {
                db_path: self.config.db_path.to_string_lossy().to_string(),
                reason: "Health check value not found".to_string(),
            });
        }

        // Clean up test data
        tree.remove(test_key)
            .map_err(|e| crate::internal_error!("Health check cleanup failed: {}", e))?;

        Ok(())
    }

    async fn stats(&self) -> Result<StorageStats> {
        let mut total_documents = 0;
        let mut collections = 0;
        for name in self.db.tree_names() {
            if name.as_ref() == b"__sled__default" || name.as_ref() == b"health" {
                continue;
            }
            let tree = self.db.open_tree(&name)?;
            collections += 1;
            total_documents += tree.len();
        }

        Ok(StorageStats {
            total_documents,
            collections,
            database_size_bytes: self.db.size_on_disk()?,
            backend: "sled".to_string(),
        })
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| crate::internal_error!("Failed to flush database: {}", e))?;
        Ok(())
    }
}

/// In-memory document store for tests, demos, and dry experiments.
///
/// Collections iterate in key order, so listings are deterministic.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, BTreeMap<String, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<(String, Document)>> {
        Ok(self
            .collections
            .get(collection)
            .map(|entry| entry.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|entry| entry.get(id).cloned()))
    }

    async fn upsert(&self, collection: &str, id: &str, document: Document) -> Result<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(mut entry) = self.collections.get_mut(collection) {
            entry.remove(id);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_documents: self.collections.iter().map(|entry| entry.len()).sum(),
            collections: self.collections.len(),
            database_size_bytes: 0,
            backend: "memory".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document(name: &str, year: i32) -> Document {
        match json!({
            "name": name,
            "year": year,
            "status": "aberto",
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryDocumentStore::new();
        store
            .upsert("cases", "1-1-silva-2023", sample_document("Silva", 2023))
            .await
            .unwrap();

        let fetched = store.get("cases", "1-1-silva-2023").await.unwrap().unwrap();
        assert_eq!(fetched.get("name"), Some(&json!("Silva")));
        assert!(store.get("cases", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_lists_in_key_order() {
        let store = MemoryDocumentStore::new();
        store.upsert("cases", "b", sample_document("B", 2021)).await.unwrap();
        store.upsert("cases", "a", sample_document("A", 2020)).await.unwrap();
        store.upsert("cases", "c", sample_document("C", 2022)).await.unwrap();

        let ids: Vec<String> = store
            .list_all("cases")
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_memory_store_delete_is_idempotent() {
        let store = MemoryDocumentStore::new();
        store.upsert("cases", "a", sample_document("A", 2020)).await.unwrap();
        store.delete("cases", "a").await.unwrap();
        store.delete("cases", "a").await.unwrap();
        assert!(store.list_all("cases").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sled_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledDocumentStore::new(StorageConfig {
            db_path: dir.path().join("registry.db"),
            enable_compression: false,
        })
        .await
        .unwrap();

        store
            .upsert("cases", "1-1-silva-2023", sample_document("Silva", 2023))
            .await
            .unwrap();
        store
            .upsert("cases", "1-2-alves-2024", sample_document("Alves", 2024))
            .await
            .unwrap();

        let fetched = store.get("cases", "1-1-silva-2023").await.unwrap().unwrap();
        assert_eq!(fetched.get("year"), Some(&json!(2023)));

        let listed = store.list_all("cases").await.unwrap();
        assert_eq!(listed.len(), 2);

        store.delete("cases", "1-1-silva-2023").await.unwrap();
        assert!(store.get("cases", "1-1-silva-2023").await.unwrap().is_none());
        assert_eq!(store.list_all("cases").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sled_store_compressed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledDocumentStore::new(StorageConfig {
            db_path: dir.path().join("registry.db"),
            enable_compression: true,
        })
        .await
        .unwrap();

        let mut document = sample_document("Silva", 2023);
        document.insert("notes".to_string(), json!("x".repeat(4096)));
        store.upsert("cases", "big", document.clone()).await.unwrap();

        let fetched = store.get("cases", "big").await.unwrap().unwrap();
        assert_eq!(fetched, document);
    }

    #[tokio::test]
    async fn test_sled_store_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledDocumentStore::new(StorageConfig {
            db_path: dir.path().join("registry.db"),
            enable_compression: false,
        })
        .await
        .unwrap();

        store.upsert("cases", "a", sample_document("A", 2020)).await.unwrap();
        store.upsert("runs", "a", sample_document("run", 2020)).await.unwrap();

        assert_eq!(store.list_all("cases").await.unwrap().len(), 1);
        assert_eq!(store.list_all("runs").await.unwrap().len(), 1);
        store.delete("runs", "a").await.unwrap();
        assert_eq!(store.list_all("cases").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sled_store_health_check_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledDocumentStore::new(StorageConfig {
            db_path: dir.path().join("registry.db"),
            enable_compression: false,
        })
        .await
        .unwrap();

        store.health_check().await.unwrap();
        store.upsert("cases", "a", sample_document("A", 2020)).await.unwrap();
        store.flush().await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.backend, "sled");
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.collections, 1);
    }
}
