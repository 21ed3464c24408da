//! Concept extraction stage
//!
//! Splits each section's text into token-bounded chunks, extracts
//! concepts per chunk concurrently, and aggregates them with set
//! semantics. A chunk whose extraction call fails contributes no
//! concepts; the failure never aborts the document.

use crate::chunker::Chunker;
use bookgraph_common::llm::ConceptExtractor;
use bookgraph_common::model::Section;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ConceptStage {
    extractor: Arc<dyn ConceptExtractor>,
    chunker: Chunker,
}

impl ConceptStage {
    pub fn new(extractor: Arc<dyn ConceptExtractor>, chunk_token_budget: usize) -> Self {
        Self {
            extractor,
            chunker: Chunker::new(chunk_token_budget),
        }
    }

    /// Extract the deduplicated concept set for one section's text.
    /// All chunk-level calls run concurrently.
    pub async fn section_concepts(&self, section_text: &str) -> Vec<String> {
        let chunks = self.chunker.chunk(section_text);
        if chunks.is_empty() {
            return Vec::new();
        }

        let results = join_all(chunks.iter().map(|chunk| self.chunk_concepts(chunk))).await;

        let set: BTreeSet<String> = results.into_iter().flatten().collect();
        set.into_iter().collect()
    }

    /// Extract concepts for all sections concurrently and store them
    /// on each section
    pub async fn annotate_sections(&self, sections: &mut [Section]) {
        let results = join_all(
            sections
                .iter()
                .map(|section| self.section_concepts(&section.text)),
        )
        .await;

        for (section, concepts) in sections.iter_mut().zip(results) {
            debug!(
                section = %section.name,
                concept_count = concepts.len(),
                "Section concepts extracted"
            );
            section.concepts = concepts;
        }
    }

    /// Release the chat model's resident memory; failures are logged
    /// and ignored
    pub async fn release_model(&self) {
        if let Err(e) = self.extractor.release().await {
            warn!(error = %e, "Failed to release extraction model memory");
        }
    }

    async fn chunk_concepts(&self, chunk: &str) -> Vec<String> {
        match self.extractor.extract(chunk).await {
            Ok(concepts) => concepts,
            Err(e) => {
                warn!(error = %e, "Concept extraction failed for chunk, skipping");
                Vec::new()
            }
        }
    }
}

/// Document-level concepts: the deduplicated union of all section
/// concept sets
pub fn document_concepts(sections: &[Section]) -> Vec<String> {
    let set: BTreeSet<String> = sections
        .iter()
        .flat_map(|s| s.concepts.iter().cloned())
        .collect();
    set.into_iter().collect()
}
