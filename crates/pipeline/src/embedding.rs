//! Section embedding stage
//!
//! Embeds each section's joined concept set. Sections without concepts
//! keep an absent embedding and are excluded from clustering. All
//! requests for one document run concurrently; the stage completes only
//! once every request has settled.

use bookgraph_common::llm::Embedder;
use bookgraph_common::model::Section;
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

pub struct EmbeddingStage {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingStage {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Embed the concept set of every section that has one
    pub async fn annotate_sections(&self, sections: &mut [Section]) {
        let results = join_all(sections.iter().map(|section| self.section_embedding(section))).await;

        for (section, embedding) in sections.iter_mut().zip(results) {
            section.concepts_embedding = embedding;
        }
    }

    /// Release the embedding model's resident memory; failures are
    /// logged and ignored
    pub async fn release_model(&self) {
        if let Err(e) = self.embedder.release().await {
            warn!(error = %e, "Failed to release embedding model memory");
        }
    }

    async fn section_embedding(&self, section: &Section) -> Option<Vec<f32>> {
        if section.concepts.is_empty() {
            return None;
        }

        let input = section.concepts.join(", ");
        match self.embedder.embed(&input).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(
                    section = %section.name,
                    error = %e,
                    "Embedding failed for section, leaving embedding absent"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bookgraph_common::errors::{AppError, Result};

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingError {
                message: "service unreachable".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            0
        }
    }

    fn section_with_concepts(name: &str, concepts: &[&str]) -> Section {
        let mut section = Section::new(name, "text", vec![]);
        section.concepts = concepts.iter().map(|c| c.to_string()).collect();
        section
    }

    #[tokio::test]
    async fn test_sections_with_concepts_get_embeddings() {
        let stage = EmbeddingStage::new(Arc::new(FixedEmbedder(vec![1.0, 2.0])));
        let mut sections = vec![
            section_with_concepts("A", &["x", "y"]),
            section_with_concepts("B", &[]),
        ];

        stage.annotate_sections(&mut sections).await;

        assert_eq!(sections[0].concepts_embedding, Some(vec![1.0, 2.0]));
        assert!(sections[1].concepts_embedding.is_none());
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_embedding_absent() {
        let stage = EmbeddingStage::new(Arc::new(FailingEmbedder));
        let mut sections = vec![section_with_concepts("A", &["x"])];

        stage.annotate_sections(&mut sections).await;

        assert!(sections[0].concepts_embedding.is_none());
    }
}
