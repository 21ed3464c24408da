//! Pipeline service error types

use bookgraph_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Structure extraction error for {path}: {message}")]
    StructureError { path: String, message: String },

    #[error("Document store error: {0}")]
    StoreError(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document {0} already has an active pipeline run")]
    AlreadyProcessing(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AppError> for PipelineError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::DocumentNotFound { id } => PipelineError::DocumentNotFound(id),
            AppError::AlreadyProcessing { id } => PipelineError::AlreadyProcessing(id),
            other => PipelineError::StoreError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_through() {
        let err: PipelineError = AppError::DocumentNotFound { id: "d1".into() }.into();
        assert!(matches!(err, PipelineError::DocumentNotFound(id) if id == "d1"));
    }

    #[test]
    fn test_already_processing_maps_through() {
        let err: PipelineError = AppError::AlreadyProcessing { id: "d2".into() }.into();
        assert!(matches!(err, PipelineError::AlreadyProcessing(id) if id == "d2"));
    }
}
