//! Retrieval service over the backend's retrieval endpoint.

use crate::dedup::dedup_chunks;
use crate::types::{RetrievalOptions, RetrievalResponse};
use ragent_client::{into_data, AuthMode, BackendClient};
use ragent_core::{AppError, AppResult};
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const RETRIEVAL_PATH: &str = "/api/v1/retrieval";

/// Anything that can turn a query into chunks.
///
/// The agent graph depends on this rather than on [`RetrievalService`], so
/// it can be driven by a scripted retriever in tests.
#[async_trait::async_trait]
pub trait ChunkRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, dataset_ids: &[String]) -> AppResult<RetrievalResponse>;
}

/// Validates, clamps and deduplicates retrieval calls.
#[derive(Debug, Clone)]
pub struct RetrievalService {
    client: Arc<BackendClient>,
    defaults: RetrievalOptions,
}

impl RetrievalService {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self {
            client,
            defaults: RetrievalOptions::default(),
        }
    }

    /// Options used by [`ChunkRetriever::retrieve`].
    pub fn with_defaults(mut self, defaults: RetrievalOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &RetrievalOptions {
        &self.defaults
    }

    /// Retrieve chunks for `question` from the given datasets.
    ///
    /// Validation happens before any request is sent. The returned chunks
    /// hold at most one entry per id.
    ///
    /// # Errors
    /// - `Validation` for an empty question or dataset list, or a non-zero
    ///   backend code
    /// - any protocol error from the client, unchanged
    #[instrument(skip(self, dataset_ids, options), fields(datasets = dataset_ids.len()))]
    pub async fn retrieve_chunks(
        &self,
        question: &str,
        dataset_ids: &[String],
        options: &RetrievalOptions,
    ) -> AppResult<RetrievalResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("question cannot be empty".to_string()));
        }
        if dataset_ids.is_empty() {
            return Err(AppError::Validation(
                "at least one dataset_id is required".to_string(),
            ));
        }

        let body = options.to_body(question, dataset_ids);
        debug!("Retrieval request: {}", body);

        let reply = self
            .client
            .post(RETRIEVAL_PATH, AuthMode::ApiKey, body)
            .await?;
        let data = into_data(reply)?;

        let mut response = RetrievalResponse::from_backend(&data);
        let before = response.chunks.len();
        response.chunks = dedup_chunks(response.chunks);

        info!(
            "Retrieved {} chunks ({} duplicates removed)",
            response.chunks.len(),
            before - response.chunks.len()
        );

        Ok(response)
    }
}

#[async_trait::async_trait]
impl ChunkRetriever for RetrievalService {
    async fn retrieve(&self, query: &str, dataset_ids: &[String]) -> AppResult<RetrievalResponse> {
        self.retrieve_chunks(query, dataset_ids, &self.defaults).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragent_client::{ClientConfig, MockReply, MockTransport, RecordingSleeper};
    use serde_json::json;
    use std::time::Duration;

    fn service(replies: Vec<MockReply>) -> (RetrievalService, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::with_replies(replies));
        let config = ClientConfig::new("http://ragflow.local", "key", "token")
            .unwrap()
            .with_retry(3, Duration::from_millis(10));
        let client = BackendClient::with_transport(
            config,
            transport.clone(),
            Arc::new(RecordingSleeper::new()),
        );
        (RetrievalService::new(Arc::new(client)), transport)
    }

    fn datasets() -> Vec<String> {
        vec!["ds1".to_string()]
    }

    #[tokio::test]
    async fn test_empty_question_no_network() {
        let (svc, transport) = service(vec![]);
        let err = svc
            .retrieve_chunks("   ", &datasets(), &RetrievalOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Validation error: question cannot be empty");
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_datasets_no_network() {
        let (svc, transport) = service(vec![]);
        let err = svc
            .retrieve_chunks("q", &[], &RetrievalOptions::default())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Validation error: at least one dataset_id is required"
        );
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_params_clamped_on_wire() {
        let (svc, transport) = service(vec![MockReply::json(
            200,
            json!({"code": 0, "data": {"chunks": [], "doc_aggs": [], "total": 0}}),
        )]);
        let options = RetrievalOptions {
            similarity_threshold: 3.0,
            top_k: 99_999,
            page_size: 0,
            ..RetrievalOptions::default()
        };

        svc.retrieve_chunks(" what is rag? ", &datasets(), &options)
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].url, "http://ragflow.local/api/v1/retrieval");
        let body = requests[0].body.as_ref().unwrap();
        assert_eq!(body["question"], "what is rag?");
        assert_eq!(body["similarity_threshold"], 1.0);
        assert_eq!(body["top_k"], 1024);
        assert_eq!(body["page_size"], 1);
        assert_eq!(body["dataset_ids"], json!(["ds1"]));
    }

    #[tokio::test]
    async fn test_duplicates_collapsed() {
        let (svc, _) = service(vec![MockReply::json(
            200,
            json!({"code": 0, "data": {
                "chunks": [
                    {"id": "a", "content": "low", "similarity": 0.2},
                    {"id": "b", "content": "b", "similarity": 0.6},
                    {"id": "a", "content": "high", "similarity": 0.7},
                ],
                "total": 3,
            }}),
        )]);

        let response = svc.retrieve("q", &datasets()).await.unwrap();
        let ids: Vec<&str> = response.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(response.chunks[1].content, "high");
        assert_eq!(response.total, 3);
    }

    #[tokio::test]
    async fn test_backend_code_is_validation() {
        let (svc, _) = service(vec![MockReply::json(
            200,
            json!({"code": 102, "message": "You don't own the dataset ds1."}),
        )]);

        let err = svc.retrieve("q", &datasets()).await.unwrap_err();
        match err {
            AppError::Validation(msg) => assert_eq!(msg, "You don't own the dataset ds1."),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_propagates_unchanged() {
        let (svc, _) = service(vec![MockReply::status(404)]);
        let err = svc.retrieve("q", &datasets()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(404));
    }
}
