//! Bookgraph Pipeline Service
//!
//! Turns uploaded books into knowledge-graph features:
//! 1. Reads the document structure from the layout service
//! 2. Extracts concepts per section with an LLM
//! 3. Embeds and clusters the section concept sets
//! 4. Merges the result into the knowledge graph
//! 5. Tracks PROCESSING/COMPLETED/FAILED status per document

mod chunker;
mod cluster;
mod concepts;
mod embedding;
mod errors;
mod processor;
mod structure;

use crate::concepts::ConceptStage;
use crate::embedding::EmbeddingStage;
use crate::processor::PipelineProcessor;
use crate::structure::LayoutServiceClient;
use bookgraph_common::{
    config::AppConfig,
    db::{repository::Repository, DbPool},
    graph::Neo4jGraph,
    llm::OllamaClient,
    VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Bookgraph Pipeline Service v{}", VERSION);

    // Initialize document store
    info!("Connecting to document store...");
    let db = DbPool::new(&config.database).await?;
    let store = Arc::new(Repository::new(db));

    // Initialize graph store
    let graph = Arc::new(Neo4jGraph::connect(&config.graph).await?);

    // Initialize LLM client, shared by extraction and embedding stages
    let llm = Arc::new(OllamaClient::new(&config.llm)?);
    info!(
        base_url = %config.llm.base_url,
        chat_model = %config.llm.chat_model,
        embedding_model = %config.llm.embedding_model,
        "LLM client initialized"
    );

    let source = Arc::new(LayoutServiceClient::new(&config.structure)?);

    let processor = PipelineProcessor::new(
        store,
        graph,
        source,
        ConceptStage::new(llm.clone(), config.llm.chunk_token_budget),
        EmbeddingStage::new(llm),
    );

    // File paths on the command line: process each and wait for the
    // terminal status. Without arguments, idle until shutdown.
    let paths: Vec<String> = std::env::args().skip(1).collect();

    if paths.is_empty() {
        info!("No documents given, waiting for shutdown signal...");
        tokio::signal::ctrl_c().await?;
        info!("Pipeline service shutting down");
        return Ok(());
    }

    for path in paths {
        let summary = match processor.accept(&path).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(path = %path, error = %e, "Failed to accept document");
                continue;
            }
        };

        info!(
            path = %path,
            document_id = %summary.document_id,
            "Document accepted, polling for completion..."
        );

        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            match processor.status(&summary.document_id).await {
                Ok(current) if current.status.is_terminal() => {
                    println!("{}: {}", summary.document_id, String::from(current.status));
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    error!(document_id = %summary.document_id, error = %e, "Status poll failed");
                    break;
                }
            }
        }
    }

    Ok(())
}
