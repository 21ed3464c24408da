//! Domain model for processed documents
//!
//! These types flow through every pipeline stage and are persisted as the
//! document-store record (nested content as JSONB) and as graph nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fallback title when the structure source exposes none
pub const DEFAULT_TITLE: &str = "Untitled";

/// Fallback author when the structure source exposes none
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// Processing status of a document's pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Terminal states are final; there is no automatic retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

impl From<String> for DocumentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "COMPLETED" => DocumentStatus::Completed,
            "FAILED" => DocumentStatus::Failed,
            _ => DocumentStatus::Processing,
        }
    }
}

impl From<DocumentStatus> for String {
    fn from(status: DocumentStatus) -> Self {
        match status {
            DocumentStatus::Processing => "PROCESSING".to_string(),
            DocumentStatus::Completed => "COMPLETED".to_string(),
            DocumentStatus::Failed => "FAILED".to_string(),
        }
    }
}

/// A paragraph within a section, as reported by the structure source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Structural depth in the document tree
    pub level: i32,

    /// Paragraph text including descendants
    pub text: String,

    /// 1-based page number
    pub page: i32,

    /// Text of the nearest ancestor node
    pub parent_text: String,

    /// Texts of all ancestors, deduplicated, order irrelevant
    pub parent_chain: BTreeSet<String>,
}

/// A structural unit of a parsed document with aggregated text,
/// nested paragraphs, and features added stage by stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,

    /// Full concatenated text including descendants
    pub text: String,

    pub paragraphs: Vec<Paragraph>,

    /// Deduplicated concepts extracted from this section's text
    #[serde(default)]
    pub concepts: Vec<String>,

    /// Embedding of the joined concept set; absent when no concepts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concepts_embedding: Option<Vec<f32>>,

    /// Cluster label assigned after clustering; absent until that stage runs.
    /// Labels carry no cross-run meaning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

impl Section {
    pub fn new(name: impl Into<String>, text: impl Into<String>, paragraphs: Vec<Paragraph>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            paragraphs,
            concepts: Vec::new(),
            concepts_embedding: None,
            cluster: None,
        }
    }
}

/// Best-effort document metadata from the structure source.
/// Missing values fall back to the documented defaults when the
/// document record is materialized.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub pages: Option<i32>,
    pub published_date: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
    pub description: Option<String>,
}

/// A fully tracked document: status record plus extracted content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    /// Opaque unique identity, minted at upload, never reused
    pub document_id: String,

    pub title: String,
    pub author: String,
    pub pages: i32,
    pub published_date: Option<DateTime<Utc>>,
    pub added_date: DateTime<Utc>,
    pub cover_image: String,
    pub description: String,

    /// Union of all section concept sets, deduplicated
    #[serde(default)]
    pub concepts: Vec<String>,

    #[serde(default)]
    pub sections: Vec<Section>,

    pub status: DocumentStatus,
}

impl ProcessedDocument {
    /// Placeholder record saved when an upload is accepted:
    /// empty sections, status PROCESSING.
    pub fn placeholder(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            title: DEFAULT_TITLE.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            pages: 0,
            published_date: None,
            added_date: Utc::now(),
            cover_image: String::new(),
            description: String::new(),
            concepts: Vec::new(),
            sections: Vec::new(),
            status: DocumentStatus::Processing,
        }
    }

    /// Terminal FAILED record with empty content
    pub fn failed(document_id: impl Into<String>) -> Self {
        let mut doc = Self::placeholder(document_id);
        doc.status = DocumentStatus::Failed;
        doc
    }

    /// Apply metadata with documented fallbacks for missing values
    pub fn apply_metadata(&mut self, metadata: &BookMetadata) {
        self.title = metadata
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        self.author = metadata
            .author
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
        self.pages = metadata.pages.unwrap_or(0);
        self.published_date = metadata.published_date;
        self.cover_image = metadata.cover_image.clone().unwrap_or_default();
        self.description = metadata.description.clone().unwrap_or_default();
    }

    pub fn summary(&self) -> DocumentStatusSummary {
        DocumentStatusSummary {
            document_id: self.document_id.clone(),
            status: self.status,
        }
    }
}

/// Thin view returned to status pollers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatusSummary {
    pub document_id: String,
    pub status: DocumentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            let s: String = status.into();
            assert_eq!(DocumentStatus::from(s), status);
        }
    }

    #[test]
    fn test_unknown_status_maps_to_processing() {
        assert_eq!(
            DocumentStatus::from("garbage".to_string()),
            DocumentStatus::Processing
        );
    }

    #[test]
    fn test_placeholder_is_empty_and_processing() {
        let doc = ProcessedDocument::placeholder("doc-1");
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert!(doc.sections.is_empty());
        assert!(doc.concepts.is_empty());
        assert_eq!(doc.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_metadata_fallbacks() {
        let mut doc = ProcessedDocument::placeholder("doc-1");
        let metadata = BookMetadata {
            title: Some("The Book".to_string()),
            author: None,
            pages: Some(42),
            ..Default::default()
        };
        doc.apply_metadata(&metadata);
        assert_eq!(doc.title, "The Book");
        assert_eq!(doc.author, DEFAULT_AUTHOR);
        assert_eq!(doc.pages, 42);
        assert!(doc.description.is_empty());
    }

    #[test]
    fn test_section_serde_defaults() {
        let json = r#"{"name":"Intro","text":"hello","paragraphs":[]}"#;
        let section: Section = serde_json::from_str(json).unwrap();
        assert!(section.concepts.is_empty());
        assert!(section.concepts_embedding.is_none());
        assert!(section.cluster.is_none());
    }
}
