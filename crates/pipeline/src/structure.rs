//! Document structure source
//!
//! The pipeline does not parse PDFs itself. A layout extraction service
//! receives the raw file and returns the document's section tree plus
//! whatever metadata it could read. This module owns the wire format of
//! that service and maps it onto the domain types.

use crate::errors::PipelineError;
use async_trait::async_trait;
use bookgraph_common::config::StructureConfig;
use bookgraph_common::model::{BookMetadata, Paragraph, Section};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Parsed structure of one document: metadata plus ordered sections
#[derive(Clone, Debug, Default)]
pub struct DocumentStructure {
    pub metadata: BookMetadata,
    pub sections: Vec<Section>,
}

/// Source of parsed document structures
#[async_trait]
pub trait StructureSource: Send + Sync {
    async fn read_document(&self, path: &Path) -> Result<DocumentStructure, PipelineError>;
}

/// HTTP client for the layout extraction service
pub struct LayoutServiceClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LayoutResponse {
    #[serde(default)]
    metadata: LayoutMetadata,
    #[serde(default)]
    sections: Vec<LayoutSection>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutMetadata {
    title: Option<String>,
    author: Option<String>,
    pages: Option<i32>,
    published_date: Option<DateTime<Utc>>,
    cover_image: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LayoutSection {
    name: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    paragraphs: Vec<LayoutParagraph>,
}

#[derive(Debug, Deserialize)]
struct LayoutParagraph {
    #[serde(default)]
    level: i32,
    text: String,
    #[serde(default)]
    page: i32,
    #[serde(default)]
    parent_text: String,
    #[serde(default)]
    parent_chain: BTreeSet<String>,
}

impl LayoutServiceClient {
    pub fn new(config: &StructureConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn structure_error(path: &Path, message: impl Into<String>) -> PipelineError {
        PipelineError::StructureError {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl StructureSource for LayoutServiceClient {
    async fn read_document(&self, path: &Path) -> Result<DocumentStructure, PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(|e| Self::structure_error(path, e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/structure", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::structure_error(path, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::structure_error(
                path,
                format!("layout service returned {}", response.status()),
            ));
        }

        let layout: LayoutResponse = response
            .json()
            .await
            .map_err(|e| Self::structure_error(path, format!("malformed response: {}", e)))?;

        let structure = DocumentStructure::from(layout);
        debug!(
            path = %path.display(),
            section_count = structure.sections.len(),
            "Document structure extracted"
        );
        Ok(structure)
    }
}

impl From<LayoutResponse> for DocumentStructure {
    fn from(layout: LayoutResponse) -> Self {
        let sections = layout
            .sections
            .into_iter()
            .map(|s| {
                let paragraphs = s
                    .paragraphs
                    .into_iter()
                    .map(|p| Paragraph {
                        level: p.level,
                        text: p.text,
                        page: p.page,
                        parent_text: p.parent_text,
                        parent_chain: p.parent_chain,
                    })
                    .collect();
                Section::new(s.name, s.text, paragraphs)
            })
            .collect();

        Self {
            metadata: BookMetadata {
                title: layout.metadata.title,
                author: layout.metadata.author,
                pages: layout.metadata.pages,
                published_date: layout.metadata.published_date,
                cover_image: layout.metadata.cover_image,
                description: layout.metadata.description,
            },
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_response_maps_to_domain() {
        let json = r#"{
            "metadata": {"title": "A Book", "pages": 12},
            "sections": [
                {
                    "name": "Intro",
                    "text": "Intro body",
                    "paragraphs": [
                        {"level": 1, "text": "Intro body", "page": 1, "parent_text": "Intro"}
                    ]
                }
            ]
        }"#;

        let layout: LayoutResponse = serde_json::from_str(json).unwrap();
        let structure = DocumentStructure::from(layout);

        assert_eq!(structure.metadata.title.as_deref(), Some("A Book"));
        assert_eq!(structure.metadata.pages, Some(12));
        assert!(structure.metadata.author.is_none());
        assert_eq!(structure.sections.len(), 1);
        assert_eq!(structure.sections[0].name, "Intro");
        assert_eq!(structure.sections[0].paragraphs[0].page, 1);
        assert!(structure.sections[0].concepts.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let json = r#"{"sections": [{"name": "Only"}]}"#;
        let layout: LayoutResponse = serde_json::from_str(json).unwrap();
        let structure = DocumentStructure::from(layout);

        assert!(structure.metadata.title.is_none());
        assert_eq!(structure.sections[0].text, "");
        assert!(structure.sections[0].paragraphs.is_empty());
    }
}
