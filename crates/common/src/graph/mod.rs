//! Graph-store layer for Bookgraph
//!
//! Merges processed documents into the knowledge graph and keeps the
//! required full-text and vector indexes in place. All writes are MERGE
//! based and keyed so that re-running the pipeline for the same
//! document_id does not duplicate nodes.

use crate::errors::Result;
use crate::config::GraphConfig;
use crate::model::{Paragraph, ProcessedDocument, Section};
use crate::EMBEDDING_DIMENSION;
use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Store abstraction for the knowledge-graph projection
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the required indexes if they do not exist (one transaction)
    async fn ensure_indexes(&self) -> Result<()>;

    /// Merge a document's structure into the graph (one transaction)
    async fn merge_document(&self, document: &ProcessedDocument) -> Result<()>;
}

/// Neo4j-backed graph store
pub struct Neo4jGraph {
    graph: Graph,
}

impl Neo4jGraph {
    /// Connect to the graph store
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        info!(uri = %config.uri, db = %config.db, "Connecting to graph store...");

        let graph_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.db.as_str())
            .build()?;

        let graph = Graph::connect(graph_config).await?;

        info!("Graph store connection established");

        Ok(Self { graph })
    }
}

/// Stable merge key for a paragraph: SHA-256 over
/// (section name, page, level, text). Paragraphs with the same key are
/// merged rather than duplicated on reprocessing.
pub fn paragraph_key(section_name: &str, paragraph: &Paragraph) -> String {
    let mut hasher = Sha256::new();
    hasher.update(section_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(paragraph.page.to_le_bytes());
    hasher.update(paragraph.level.to_le_bytes());
    hasher.update(paragraph.text.as_bytes());
    hex::encode(hasher.finalize())
}

fn index_queries() -> Vec<Query> {
    vec![
        query(
            "CREATE FULLTEXT INDEX paragraph_text_index IF NOT EXISTS \
             FOR (p:Paragraph) ON EACH [p.text]",
        ),
        query(
            "CREATE FULLTEXT INDEX concept_name_index IF NOT EXISTS \
             FOR (c:Concept) ON EACH [c.name]",
        ),
        query(
            "CREATE FULLTEXT INDEX section_text_index IF NOT EXISTS \
             FOR (s:Section) ON EACH [s.text]",
        ),
        query(&format!(
            "CREATE VECTOR INDEX section_concepts_embedding_index IF NOT EXISTS \
             FOR (s:Section) ON (s.concepts_embedding) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {}, \
             `vector.similarity_function`: 'cosine'}}}}",
            EMBEDDING_DIMENSION
        )),
    ]
}

const MERGE_BOOK_CYPHER: &str = "MERGE (b:Book {title: $title, id: $document_id}) \
     SET b.author = $author, b.pages = $pages, b.description = $description";

const MERGE_PARAGRAPH_CYPHER: &str = "MATCH (s:Section {name: $section_name}) \
     MERGE (p:Paragraph {key: $key}) \
     SET p.level = $level, p.text = $text, p.page = $page, \
         p.parent_text = $parent_text, p.parent_chain = $parent_chain \
     MERGE (s)-[:HAS_PARAGRAPH]->(p)";

const MERGE_SECTION_CONCEPT_CYPHER: &str = "MATCH (s:Section {name: $section_name}) \
     MERGE (c:Concept {name: $name}) \
     MERGE (c)-[:MENTIONS]->(s)";

const MERGE_BOOK_CONCEPT_CYPHER: &str = "MATCH (b:Book {id: $document_id}) \
     MERGE (c:Concept {name: $name}) \
     MERGE (b)-[:HAS_CONCEPT]->(c)";

/// Section write with the optional SET clauses included only when the
/// section carries those features
fn section_merge_cypher(section: &Section) -> String {
    let mut cypher = String::from(
        "MATCH (b:Book {id: $document_id}) \
         MERGE (s:Section {name: $name}) \
         SET s.text = $text",
    );
    if section.cluster.is_some() {
        cypher.push_str(", s.cluster = $cluster");
    }
    if section.concepts_embedding.is_some() {
        cypher.push_str(", s.concepts_embedding = $embedding");
    }
    cypher.push_str(" MERGE (b)-[:HAS_SECTION]->(s)");
    cypher
}

fn merge_book_query(document: &ProcessedDocument) -> Query {
    query(MERGE_BOOK_CYPHER)
        .param("title", document.title.as_str())
        .param("document_id", document.document_id.as_str())
        .param("author", document.author.as_str())
        .param("pages", i64::from(document.pages))
        .param("description", document.description.as_str())
}

fn merge_section_query(document_id: &str, section: &Section) -> Query {
    let cypher = section_merge_cypher(section);

    let mut q = query(&cypher)
        .param("document_id", document_id)
        .param("name", section.name.as_str())
        .param("text", section.text.as_str());

    if let Some(cluster) = &section.cluster {
        q = q.param("cluster", cluster.as_str());
    }
    if let Some(embedding) = &section.concepts_embedding {
        let values: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
        q = q.param("embedding", values);
    }

    q
}

fn merge_paragraph_query(section: &Section, paragraph: &Paragraph) -> Query {
    let parent_chain: Vec<String> = paragraph.parent_chain.iter().cloned().collect();

    query(MERGE_PARAGRAPH_CYPHER)
        .param("section_name", section.name.as_str())
        .param("key", paragraph_key(&section.name, paragraph))
        .param("level", i64::from(paragraph.level))
        .param("text", paragraph.text.as_str())
        .param("page", i64::from(paragraph.page))
        .param("parent_text", paragraph.parent_text.as_str())
        .param("parent_chain", parent_chain)
}

fn merge_section_concept_query(section_name: &str, concept: &str) -> Query {
    query(MERGE_SECTION_CONCEPT_CYPHER)
        .param("section_name", section_name)
        .param("name", concept)
}

fn merge_book_concept_query(document_id: &str, concept: &str) -> Query {
    query(MERGE_BOOK_CONCEPT_CYPHER)
        .param("document_id", document_id)
        .param("name", concept)
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    async fn ensure_indexes(&self) -> Result<()> {
        let mut txn = self.graph.start_txn().await?;
        txn.run_queries(index_queries()).await?;
        txn.commit().await?;

        debug!("Graph indexes ensured");
        Ok(())
    }

    async fn merge_document(&self, document: &ProcessedDocument) -> Result<()> {
        let mut queries = Vec::new();
        queries.push(merge_book_query(document));

        for section in &document.sections {
            queries.push(merge_section_query(&document.document_id, section));

            for paragraph in &section.paragraphs {
                queries.push(merge_paragraph_query(section, paragraph));
            }

            for concept in &section.concepts {
                queries.push(merge_section_concept_query(&section.name, concept));
            }
        }

        for concept in &document.concepts {
            queries.push(merge_book_concept_query(&document.document_id, concept));
        }

        let query_count = queries.len();

        let mut txn = self.graph.start_txn().await?;
        txn.run_queries(queries).await?;
        txn.commit().await?;

        info!(
            document_id = %document.document_id,
            section_count = document.sections.len(),
            query_count,
            "Document merged into knowledge graph"
        );

        Ok(())
    }
}
