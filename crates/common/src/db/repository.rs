//! Status tracker repository
//!
//! Persists and transitions the per-document processing record. This is
//! the single source of truth for polling; the graph store is a derived,
//! eventually-consistent projection.

use crate::db::models::{active_model_from, DocumentEntity};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::model::ProcessedDocument;
use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbBackend, EntityTrait, Statement};

/// Store abstraction for the processing-status record.
///
/// `update` and `get` fail with `DocumentNotFound` for unknown ids.
/// `begin_processing` is a status-guarded compare-and-set: it rejects a
/// second concurrent run for the same document_id with `AlreadyProcessing`.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Create the initial record (status PROCESSING, empty sections)
    async fn save(&self, document: &ProcessedDocument) -> Result<ProcessedDocument>;

    /// Replace the record by document_id, returning the post-update document
    async fn update(&self, document: &ProcessedDocument) -> Result<ProcessedDocument>;

    /// Point lookup by document_id
    async fn get(&self, document_id: &str) -> Result<ProcessedDocument>;

    /// Transition an existing document back into PROCESSING, guarded so
    /// that only one run can hold the transition at a time
    async fn begin_processing(&self, document_id: &str) -> Result<ProcessedDocument>;
}

/// Postgres-backed status tracker
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[async_trait]
impl StatusStore for Repository {
    async fn save(&self, document: &ProcessedDocument) -> Result<ProcessedDocument> {
        let model = active_model_from(document)?
            .insert(self.pool.conn())
            .await?;
        model.into_processed()
    }

    async fn update(&self, document: &ProcessedDocument) -> Result<ProcessedDocument> {
        let existing = DocumentEntity::find_by_id(&document.document_id)
            .one(self.pool.conn())
            .await?;

        if existing.is_none() {
            return Err(AppError::DocumentNotFound {
                id: document.document_id.clone(),
            });
        }

        let mut active = active_model_from(document)?;
        // Full replace of an existing row; the key itself never changes
        active.document_id = sea_orm::Unchanged(document.document_id.clone());

        let model = active.update(self.pool.conn()).await?;
        model.into_processed()
    }

    async fn get(&self, document_id: &str) -> Result<ProcessedDocument> {
        let model = DocumentEntity::find_by_id(document_id)
            .one(self.pool.conn())
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        model.into_processed()
    }

    async fn begin_processing(&self, document_id: &str) -> Result<ProcessedDocument> {
        // Compare-and-set on the status column; rows_affected == 0 means
        // either the document is unknown or another run is already active.
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE documents
            SET status = 'PROCESSING', updated_at = NOW()
            WHERE document_id = $1 AND status <> 'PROCESSING'
            "#,
            vec![document_id.into()],
        );

        let result = self.pool.conn().execute(stmt).await?;

        if result.rows_affected() == 0 {
            return match DocumentEntity::find_by_id(document_id)
                .one(self.pool.conn())
                .await?
            {
                Some(_) => Err(AppError::AlreadyProcessing {
                    id: document_id.to_string(),
                }),
                None => Err(AppError::DocumentNotFound {
                    id: document_id.to_string(),
                }),
            };
        }

        self.get(document_id).await
    }
}
