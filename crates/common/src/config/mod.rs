//! Configuration management for Bookgraph services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/<env>.toml, config/local.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Document store (Postgres) configuration
    pub database: DatabaseConfig,

    /// Graph store (Neo4j) configuration
    pub graph: GraphConfig,

    /// LLM inference and embedding configuration
    pub llm: LlmConfig,

    /// Document structure source (layout service) configuration
    pub structure: StructureConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Bolt URI, e.g. 127.0.0.1:7687
    pub uri: String,

    /// Username
    pub user: String,

    /// Password
    pub password: String,

    /// Database name
    #[serde(default = "default_graph_db")]
    pub db: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Base URL of the inference service
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Chat model used for concept extraction
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for embedding/extraction requests
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// Token budget per concept-extraction chunk
    #[serde(default = "default_chunk_token_budget")]
    pub chunk_token_budget: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StructureConfig {
    /// Base URL of the PDF layout extraction service
    #[serde(default = "default_structure_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_structure_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_graph_db() -> String { "neo4j".to_string() }
fn default_llm_base_url() -> String { "http://localhost:11434".to_string() }
fn default_chat_model() -> String { "llama3.1".to_string() }
fn default_embedding_model() -> String { "nomic-embed-text".to_string() }
fn default_embedding_dimension() -> usize { 768 }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_retries() -> u32 { 3 }
fn default_chunk_token_budget() -> usize { 512 }
fn default_structure_base_url() -> String { "http://localhost:5010".to_string() }
fn default_structure_timeout() -> u64 { 120 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "bookgraph-pipeline".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the LLM request timeout as Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/bookgraph".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            graph: GraphConfig {
                uri: "127.0.0.1:7687".to_string(),
                user: "neo4j".to_string(),
                password: String::new(),
                db: default_graph_db(),
            },
            llm: LlmConfig {
                base_url: default_llm_base_url(),
                chat_model: default_chat_model(),
                embedding_model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_llm_timeout(),
                max_retries: default_llm_retries(),
                chunk_token_budget: default_chunk_token_budget(),
            },
            structure: StructureConfig {
                base_url: default_structure_base_url(),
                timeout_secs: default_structure_timeout(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                service_name: default_service_name(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.dimension, 768);
        assert_eq!(config.llm.chunk_token_budget, 512);
        assert_eq!(config.graph.db, "neo4j");
    }

    #[test]
    fn test_llm_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.llm_timeout(), Duration::from_secs(60));
    }
}
