//! Bookgraph Common Library
//!
//! Shared code for the Bookgraph pipeline services including:
//! - Domain model (documents, sections, paragraphs, concepts)
//! - Document-store repository (processing status and content)
//! - Graph-store client (knowledge-graph merge and indexes)
//! - LLM clients for concept extraction and embeddings
//! - Error types and handling
//! - Configuration management

pub mod config;
pub mod db;
pub mod errors;
pub mod graph;
pub mod llm;
pub mod model;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{Repository, StatusStore};
pub use errors::{AppError, Result};
pub use graph::GraphStore;
pub use llm::{ConceptExtractor, Embedder};
pub use model::{DocumentStatus, ProcessedDocument, Section};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Embedding dimension used by the section vector index
pub const EMBEDDING_DIMENSION: usize = 768;
