//! Document processing record entity
//!
//! One row per uploaded document: metadata columns plus nested content
//! (sections, concepts) stored as JSONB. This table is the source of
//! truth for status polling; the graph store is a derived projection.

use crate::errors::{AppError, Result as AppResult};
use crate::model::{DocumentStatus, ProcessedDocument, Section};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    /// Opaque unique identity minted at upload time
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub document_id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub author: String,

    pub pages: i32,

    pub published_date: Option<DateTimeWithTimeZone>,

    pub added_date: DateTimeWithTimeZone,

    #[sea_orm(column_type = "Text")]
    pub cover_image: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Document-level concept set as JSONB
    #[sea_orm(column_type = "JsonBinary")]
    pub concepts: Json,

    /// Full section tree (paragraphs, concepts, embeddings, clusters) as JSONB
    #[sea_orm(column_type = "JsonBinary")]
    pub sections: Json,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Get the processing status as an enum
    pub fn document_status(&self) -> DocumentStatus {
        DocumentStatus::from(self.status.clone())
    }

    /// Decode the row back into the domain type
    pub fn into_processed(self) -> AppResult<ProcessedDocument> {
        let sections: Vec<Section> = serde_json::from_value(self.sections)?;
        let concepts: Vec<String> = serde_json::from_value(self.concepts)?;

        Ok(ProcessedDocument {
            document_id: self.document_id,
            title: self.title,
            author: self.author,
            pages: self.pages,
            published_date: self.published_date.map(Into::into),
            added_date: self.added_date.into(),
            cover_image: self.cover_image,
            description: self.description,
            concepts,
            sections,
            status: DocumentStatus::from(self.status),
        })
    }
}

/// Build an active model from the domain type
pub fn active_model_from(document: &ProcessedDocument) -> AppResult<ActiveModel> {
    let sections = serde_json::to_value(&document.sections)?;
    let concepts = serde_json::to_value(&document.concepts)?;
    let now = chrono::Utc::now();

    Ok(ActiveModel {
        document_id: Set(document.document_id.clone()),
        title: Set(document.title.clone()),
        author: Set(document.author.clone()),
        pages: Set(document.pages),
        published_date: Set(document.published_date.map(Into::into)),
        added_date: Set(document.added_date.into()),
        cover_image: Set(document.cover_image.clone()),
        description: Set(document.description.clone()),
        concepts: Set(concepts),
        sections: Set(sections),
        status: Set(String::from(document.status)),
        updated_at: Set(now.into()),
    })
}

impl TryFrom<Model> for ProcessedDocument {
    type Error = AppError;

    fn try_from(model: Model) -> AppResult<Self> {
        model.into_processed()
    }
}
