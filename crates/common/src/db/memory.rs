//! In-memory status store
//!
//! Backs pipeline tests and local experiments without a running Postgres.
//! Mirrors the repository's semantics, including the PROCESSING
//! compare-and-set guard.

use crate::db::repository::StatusStore;
use crate::errors::{AppError, Result};
use crate::model::{DocumentStatus, ProcessedDocument};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryStatusStore {
    records: Mutex<HashMap<String, ProcessedDocument>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn save(&self, document: &ProcessedDocument) -> Result<ProcessedDocument> {
        let mut records = self.records.lock().await;
        records.insert(document.document_id.clone(), document.clone());
        Ok(document.clone())
    }

    async fn update(&self, document: &ProcessedDocument) -> Result<ProcessedDocument> {
        let mut records = self.records.lock().await;
        if !records.contains_key(&document.document_id) {
            return Err(AppError::DocumentNotFound {
                id: document.document_id.clone(),
            });
        }
        records.insert(document.document_id.clone(), document.clone());
        Ok(document.clone())
    }

    async fn get(&self, document_id: &str) -> Result<ProcessedDocument> {
        let records = self.records.lock().await;
        records
            .get(document_id)
            .cloned()
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })
    }

    async fn begin_processing(&self, document_id: &str) -> Result<ProcessedDocument> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(document_id)
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        if record.status == DocumentStatus::Processing {
            return Err(AppError::AlreadyProcessing {
                id: document_id.to_string(),
            });
        }

        record.status = DocumentStatus::Processing;
        Ok(record.clone())
    }
}
