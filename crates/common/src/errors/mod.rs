//! Error types for Bookgraph services
//!
//! Store and client errors surface here; upstream LLM failures are
//! degraded at the smallest unit of work by the pipeline and mostly
//! never reach callers.

use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    // Concurrency guard
    #[error("Document {id} already has an active pipeline run")]
    AlreadyProcessing { id: String },

    // Document store errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Graph store errors
    #[error("Graph store error: {0}")]
    Graph(#[from] neo4rs::Error),

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Concept extraction error: {message}")]
    ConceptExtractionError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Whether this error indicates a missing document record
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::DocumentNotFound { .. })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_predicate() {
        let err = AppError::DocumentNotFound { id: "x".into() };
        assert!(err.is_not_found());
        let err = AppError::AlreadyProcessing { id: "x".into() };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_display_includes_id() {
        let err = AppError::AlreadyProcessing { id: "doc-9".into() };
        assert!(err.to_string().contains("doc-9"));
    }
}
