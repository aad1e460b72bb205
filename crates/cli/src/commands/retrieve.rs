//! Retrieve command handler.
//!
//! Runs a single retrieval against the backend without involving the model.

use super::{backend_client, print_json};
use clap::Args;
use ragent_core::{config::AppConfig, AppResult};
use ragent_retrieval::{format_chunks_for_agent, RetrievalOptions, RetrievalService};

/// Retrieve chunks for a query
#[derive(Args, Debug)]
pub struct RetrieveCommand {
    /// Query text
    pub query: String,

    /// Dataset to search (repeatable)
    #[arg(short, long = "dataset", required = true)]
    pub datasets: Vec<String>,

    /// Restrict to these documents (repeatable)
    #[arg(long = "document")]
    pub documents: Vec<String>,

    /// Minimum similarity, 0.0-1.0
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Weight of vector similarity against term similarity, 0.0-1.0
    #[arg(long)]
    pub vector_weight: Option<f64>,

    /// Candidates considered by the backend
    #[arg(short = 'k', long)]
    pub top_k: Option<u32>,

    /// Chunks shown in text output
    #[arg(short = 'n', long)]
    pub max_chunks: Option<usize>,

    /// Enable keyword matching
    #[arg(long)]
    pub keyword: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RetrieveCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing retrieve command");

        let service = RetrievalService::new(backend_client(config)?);
        let options = self.options(config);
        let response = service
            .retrieve_chunks(&self.query, &self.datasets, &options)
            .await?;

        if self.json {
            return print_json(&response);
        }

        let max_chunks = self
            .max_chunks
            .unwrap_or(config.retrieval.max_formatted_chunks);
        println!("{}", format_chunks_for_agent(&response.chunks, max_chunks));
        tracing::debug!(
            "{} chunks returned, {} matches in total",
            response.chunks.len(),
            response.total
        );
        Ok(())
    }

    fn options(&self, config: &AppConfig) -> RetrievalOptions {
        let mut options = RetrievalOptions::from_settings(&config.retrieval);
        if let Some(threshold) = self.threshold {
            options.similarity_threshold = threshold;
        }
        if let Some(weight) = self.vector_weight {
            options.vector_similarity_weight = weight;
        }
        if let Some(top_k) = self.top_k {
            options.top_k = top_k;
        }
        options.document_ids = self.documents.clone();
        options.keyword = self.keyword;
        options
    }
}
