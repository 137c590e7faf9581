//! # Case Registry - Case Identity & Renumbering Engine
//!
//! ## Overview
//! This library maintains the derived identity of legal case records: their
//! sequence number inside a case-type partition, their canonical display
//! title, and their URL-safe slug, which doubles as the storage key. It keeps
//! those three artifacts consistent as cases are created, edited, and
//! deleted, and it detects and merges duplicate records that accumulated
//! before the identity rules were enforced.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `slug`: Diacritic-stripping slugification and slug assembly
//! - `numbering`: Chronological ordering keys, sequence ranks, title format
//! - `renumber`: Batch renumbering plans for a case-type partition
//! - `dedup`: Duplicate detection (slug / title / name+year) and merge plans
//! - `registry`: The engine tying plans to the document store and cache
//! - `storage`: Document store abstraction with sled and in-memory backends
//! - `cache`: TTL snapshot cache invalidated on every write
//! - `api`: REST endpoints and the user notification surface
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Case documents (JSON), case create/update requests
//! - **Output**: Renumbered documents, renumber/dedup reports, notifications
//! - **Consistency**: Slugs unique collection-wide, numbers gapless per type
//!
//! ## Usage
//! ```rust,no_run
//! use case_registry::{CaseRegistry, CaseType, Config, MemoryDocumentStore, NewCase, SnapshotCache};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let store = Arc::new(MemoryDocumentStore::new());
//!     let cache = Arc::new(SnapshotCache::new(&config.cache));
//!     let registry = CaseRegistry::new(config, store, cache);
//!
//!     let mut input = NewCase::new("Silva", CaseType::Antigo);
//!     input.year = Some(2023);
//!     input.month = Some(3);
//!     let case = registry.create_case(input).await?;
//!     println!("created {}", case.record.title);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod slug;
pub mod numbering;
pub mod renumber;
pub mod dedup;
pub mod cache;
pub mod storage;
pub mod registry;
pub mod api;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use cache::SnapshotCache;
pub use config::Config;
pub use dedup::{DedupReport, DuplicateGroup, DuplicateKind, DuplicateReport};
pub use errors::{RegistryError, Result};
pub use registry::{CaseRegistry, CasePatch, NewCase, RegistryStats};
pub use renumber::RenumberReport;
pub use storage::{Document, DocumentStore, MemoryDocumentStore, SledDocumentStore};

// Core types used throughout the system
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Collection holding the case documents.
pub const CASES_COLLECTION: &str = "cases";

/// Collection holding the journal of batch runs (renumber, dedup).
pub const RUNS_COLLECTION: &str = "runs";

/// Case type partitions. Each type has its own numbering sequence and its
/// own title prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseType {
    /// Legacy matters opened before the current numbering scheme.
    Antigo,
    /// Matters opened under the current scheme.
    Novo,
    /// Prospective matters not yet formally opened.
    Futuro,
}

impl CaseType {
    /// All partitions, in the order batch operations walk them.
    pub const ALL: [CaseType; 3] = [CaseType::Antigo, CaseType::Novo, CaseType::Futuro];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::Antigo => "antigo",
            CaseType::Novo => "novo",
            CaseType::Futuro => "futuro",
        }
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "antigo" => Ok(CaseType::Antigo),
            "novo" => Ok(CaseType::Novo),
            "futuro" => Ok(CaseType::Futuro),
            _ => Err(RegistryError::UnknownCaseType { value: s.to_string() }),
        }
    }
}

/// A case document as the engine models it.
///
/// Only the identity fields are typed here. Everything else present in the
/// stored document (clients, status, filing details, ...) is captured in
/// `extra` and written back untouched on every update.
///
/// Reads are tolerant: legacy documents carry years as strings, flags as
/// numbers, and half the fields missing, so the numeric and temporal fields
/// fall back to `None` instead of failing the whole record. Writes performed
/// through [`registry::CaseRegistry`] are strict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseRecord {
    /// URL-safe unique identifier, also used as the storage key.
    #[serde(default)]
    pub slug: String,
    /// Canonical display title, `"{prefix}.{number} - {name} / {year}"`.
    #[serde(default)]
    pub title: String,
    /// Client or matter name the title and slug are derived from.
    #[serde(default)]
    pub name: String,
    /// Four-digit opening year. Absent or malformed values sort last.
    #[serde(default, deserialize_with = "de_lenient_i32", skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Opening month, 1-12. Absent or malformed values sort as December.
    #[serde(default, deserialize_with = "de_lenient_u32", skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    /// Explicit partition. Takes precedence over `is_new_case`.
    #[serde(default, deserialize_with = "de_lenient_case_type", skip_serializing_if = "Option::is_none")]
    pub case_type: Option<CaseType>,
    /// Legacy boolean partition flag, kept for documents that predate
    /// `case_type`. `true` maps to [`CaseType::Novo`].
    #[serde(default, deserialize_with = "de_lenient_bool", skip_serializing_if = "Option::is_none")]
    pub is_new_case: Option<bool>,
    /// 1-based sequence number within the partition.
    #[serde(default, deserialize_with = "de_lenient_u32", skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(default, deserialize_with = "de_lenient_datetime", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_lenient_datetime", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Pass-through fields the engine does not interpret.
    #[serde(flatten)]
    pub extra: storage::Document,
}

impl CaseRecord {
    /// Resolves the partition this record belongs to.
    ///
    /// `case_type` wins when present; otherwise the legacy `is_new_case`
    /// flag maps `true` to Novo and anything else to Antigo.
    pub fn effective_type(&self) -> CaseType {
        match self.case_type {
            Some(t) => t,
            None => match self.is_new_case {
                Some(true) => CaseType::Novo,
                _ => CaseType::Antigo,
            },
        }
    }

    /// Year rendered for slugs and titles; empty when the year is absent.
    pub fn year_label(&self) -> String {
        self.year.map(|y| y.to_string()).unwrap_or_default()
    }

    /// Parses a stored document into a record, tolerating legacy field
    /// encodings. Fails only when the document cannot be walked as a JSON
    /// object at all.
    pub fn from_document(doc: &storage::Document) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(doc.clone())).map_err(|e| {
            RegistryError::Serialization {
                context: "case document".to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Serializes the record back to its document form, identity fields and
    /// pass-through fields merged into one flat object.
    pub fn to_document(&self) -> Result<storage::Document> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(crate::internal_error!("case record did not serialize to an object")),
            Err(e) => Err(RegistryError::Serialization {
                context: "case record".to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// A case together with the storage key it currently lives under.
///
/// The key normally equals `record.slug`; the two diverge only in drifted
/// legacy data, which the renumbering pass heals by migrating the document
/// to its proper key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCase {
    /// Storage key (document id) in the case collection.
    pub id: String,
    #[serde(flatten)]
    pub record: CaseRecord,
}

impl StoredCase {
    pub fn new(id: impl Into<String>, record: CaseRecord) -> Self {
        Self { id: id.into(), record }
    }
}

/// Application state shared across components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Config>,
    pub registry: Arc<registry::CaseRegistry>,
    pub storage: Arc<dyn storage::DocumentStore>,
}

// Lenient field decoders for legacy documents. Each accepts the sane JSON
// encoding plus the encodings observed in migrated data, and yields `None`
// for anything else rather than poisoning the record.

fn de_lenient_i32<'de, D>(deserializer: D) -> std::result::Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(lenient_i64).and_then(|n| i32::try_from(n).ok()))
}

fn de_lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(lenient_i64).and_then(|n| u32::try_from(n).ok()))
}

fn de_lenient_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| match v {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_i64().map(|n| n != 0),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }))
}

fn de_lenient_case_type<'de, D>(deserializer: D) -> std::result::Result<Option<CaseType>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| CaseType::from_str(s).ok()))
}

fn de_lenient_datetime<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

fn lenient_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> storage::Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    #[test]
    fn test_effective_type_precedence() {
        let mut record = CaseRecord::default();
        assert_eq!(record.effective_type(), CaseType::Antigo);

        record.is_new_case = Some(true);
        assert_eq!(record.effective_type(), CaseType::Novo);

        record.case_type = Some(CaseType::Futuro);
        assert_eq!(record.effective_type(), CaseType::Futuro);
    }

    #[test]
    fn test_lenient_year_month_parsing() {
        let record = CaseRecord::from_document(&doc(json!({
            "name": "Silva",
            "year": "2023",
            "month": "3",
        })))
        .unwrap();
        assert_eq!(record.year, Some(2023));
        assert_eq!(record.month, Some(3));

        let record = CaseRecord::from_document(&doc(json!({
            "name": "Silva",
            "year": "indeterminado",
            "month": {"nested": true},
        })))
        .unwrap();
        assert_eq!(record.year, None);
        assert_eq!(record.month, None);
    }

    #[test]
    fn test_lenient_legacy_flag() {
        let record = CaseRecord::from_document(&doc(json!({"is_new_case": "true"}))).unwrap();
        assert_eq!(record.is_new_case, Some(true));
        assert_eq!(record.effective_type(), CaseType::Novo);

        let record = CaseRecord::from_document(&doc(json!({"is_new_case": 0}))).unwrap();
        assert_eq!(record.is_new_case, Some(false));
    }

    #[test]
    fn test_extra_fields_round_trip() {
        let original = doc(json!({
            "slug": "1-1-silva-2023",
            "title": "1.1 - Silva / 2023",
            "name": "Silva",
            "year": 2023,
            "client_email": "silva@example.com",
            "tags": ["trabalhista", "urgente"],
        }));
        let record = CaseRecord::from_document(&original).unwrap();
        assert_eq!(
            record.extra.get("client_email").and_then(|v| v.as_str()),
            Some("silva@example.com")
        );

        let written = record.to_document().unwrap();
        assert_eq!(written.get("client_email"), original.get("client_email"));
        assert_eq!(written.get("tags"), original.get("tags"));
        assert_eq!(written.get("year"), Some(&json!(2023)));
    }

    #[test]
    fn test_absent_fields_not_serialized() {
        let record = CaseRecord {
            name: "Alves".to_string(),
            ..Default::default()
        };
        let written = record.to_document().unwrap();
        assert!(!written.contains_key("year"));
        assert!(!written.contains_key("number"));
        assert!(!written.contains_key("is_new_case"));
    }

    #[test]
    fn test_case_type_string_round_trip() {
        for case_type in CaseType::ALL {
            let parsed: CaseType = case_type.as_str().parse().unwrap();
            assert_eq!(parsed, case_type);
        }
        assert!("processo".parse::<CaseType>().is_err());
        assert_eq!("NOVO".parse::<CaseType>().unwrap(), CaseType::Novo);
    }
}
