//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration management for the case registry, supporting
//! multiple sources (files, environment variables, command line arguments)
//! with validation and type-safe access to all system settings.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML), environment variables, CLI arguments
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Type checking, range validation, dependency verification
//!
//! ## Key Features
//! - Hierarchical configuration with environment-specific overrides
//! - Automatic validation with detailed error messages
//! - Partial files supported: omitted sections fall back to defaults
//! - Numbering policy (type prefix table) kept in configuration, not code
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Command line arguments (highest priority)
//! 2. Environment variables
//! 3. Configuration files
//! 4. Default values (lowest priority)
//!
//! ## Usage
//! ```rust
//! use case_registry::config::Config;
//!
//! # fn main() -> case_registry::errors::Result<()> {
//! // Load from default locations
//! let config = Config::load()?;
//! println!("Server port: {}", config.server.port);
//! # Ok(())
//! # }
//! ```

use crate::errors::{RegistryError, Result};
use crate::CaseType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server and API configuration
    pub server: ServerConfig,
    /// Numbering and title policy
    pub numbering: NumberingConfig,
    /// Storage and database settings
    pub storage: StorageConfig,
    /// Snapshot cache behavior
    pub cache: CacheConfig,
    /// Duplicate detection behavior
    pub dedup: DedupConfig,
    /// Logging and monitoring
    pub logging: LoggingConfig,
}

/// Server and API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of HTTP worker threads
    pub workers: usize,
    /// Enable CORS
    pub enable_cors: bool,
}

/// Numbering and title policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    /// Title prefix per case type, keyed by the lowercase type name.
    pub prefixes: HashMap<String, u32>,
    /// Prefix used for types missing from the table.
    pub default_prefix: u32,
    /// Renumber the affected partition after a case is deleted.
    pub renumber_on_delete: bool,
}

impl NumberingConfig {
    /// Resolves the title prefix for a partition, falling back to
    /// `default_prefix` when the table has no entry.
    pub fn prefix_for(&self, case_type: CaseType) -> u32 {
        self.prefixes
            .get(case_type.as_str())
            .copied()
            .unwrap_or(self.default_prefix)
    }
}

/// Storage and database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path
    pub db_path: PathBuf,
    /// Enable gzip compression of stored documents
    pub enable_compression: bool,
}

/// Snapshot cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable snapshot caching
    pub enabled: bool,
    /// Time to live for cached snapshots, in seconds
    pub ttl_seconds: u64,
}

/// Duplicate detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Run a read-only duplicate scan when the server starts
    pub scan_on_startup: bool,
}

/// Logging and monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable structured JSON logging
    pub json_format: bool,
}

impl Config {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|e| RegistryError::Config {
            message: format!("Failed to read config file {:?}: {}", path, e),
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| RegistryError::Config {
            message: format!("Failed to parse config file {:?}: {}", path, e),
        })?;

        // Apply environment variable overrides
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // Server configuration
        if let Ok(host) = std::env::var("CASE_REGISTRY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CASE_REGISTRY_PORT") {
            self.server.port = port.parse().map_err(|_| RegistryError::Config {
                message: "Invalid port number in CASE_REGISTRY_PORT".to_string(),
            })?;
        }

        // Database configuration
        if let Ok(db_path) = std::env::var("CASE_REGISTRY_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }

        // Cache and logging
        if let Ok(ttl) = std::env::var("CASE_REGISTRY_CACHE_TTL") {
            self.cache.ttl_seconds = ttl.parse().map_err(|_| RegistryError::Config {
                message: "Invalid TTL in CASE_REGISTRY_CACHE_TTL".to_string(),
            })?;
        }
        if let Ok(level) = std::env::var("CASE_REGISTRY_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RegistryError::ValidationFailed {
                field: "server.port".to_string(),
                reason: "Port cannot be zero".to_string(),
            });
        }

        if self.server.workers == 0 {
            return Err(RegistryError::ValidationFailed {
                field: "server.workers".to_string(),
                reason: "At least one worker is required".to_string(),
            });
        }

        if self.numbering.default_prefix == 0 {
            return Err(RegistryError::ValidationFailed {
                field: "numbering.default_prefix".to_string(),
                reason: "Prefixes are 1-based".to_string(),
            });
        }

        for (name, prefix) in &self.numbering.prefixes {
            if *prefix == 0 {
                return Err(RegistryError::ValidationFailed {
                    field: format!("numbering.prefixes.{}", name),
                    reason: "Prefixes are 1-based".to_string(),
                });
            }
        }

        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            return Err(RegistryError::ValidationFailed {
                field: "cache.ttl_seconds".to_string(),
                reason: "TTL must be at least one second when the cache is enabled".to_string(),
            });
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(RegistryError::ValidationFailed {
                field: "logging.level".to_string(),
                reason: format!("Unknown log level '{}'", self.logging.level),
            });
        }

        Ok(())
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RegistryError::Config {
            message: format!("Failed to serialize config to TOML: {}", e),
        })
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: num_cpus::get().min(4),
            enable_cors: true,
        }
    }
}

impl Default for NumberingConfig {
    fn default() -> Self {
        let mut prefixes = HashMap::new();
        prefixes.insert("antigo".to_string(), 1);
        prefixes.insert("novo".to_string(), 2);
        prefixes.insert("futuro".to_string(), 2);
        Self {
            prefixes,
            default_prefix: 1,
            renumber_on_delete: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/case_registry.db"),
            enable_compression: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            scan_on_startup: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}
