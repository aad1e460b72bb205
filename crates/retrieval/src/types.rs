//! Retrieval request options and normalized response types.

use ragent_core::config::RetrievalSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.2;
pub const DEFAULT_VECTOR_SIMILARITY_WEIGHT: f64 = 0.3;
pub const DEFAULT_TOP_K: u32 = 1024;
pub const DEFAULT_PAGE_SIZE: u32 = 30;
pub const MAX_TOP_K: u32 = 1024;
pub const MAX_PAGE_SIZE: u32 = 30;

/// One retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalChunk {
    pub id: String,
    pub content: String,
    pub document_id: String,
    pub document_name: String,
    pub dataset_id: String,
    /// Combined score in [0, 1]
    pub similarity: f64,
    pub vector_similarity: f64,
    pub term_similarity: f64,
    #[serde(default)]
    pub positions: Vec<Value>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

impl RetrievalChunk {
    /// Build a chunk from one untrusted backend object.
    ///
    /// Returns `None` when the object has no usable id. Accepts the
    /// backend's alternate field names and forces every score into [0, 1].
    pub fn from_backend(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let id = first_str(obj, &["id", "chunk_id"])?;
        if id.trim().is_empty() {
            return None;
        }

        Some(Self {
            id,
            content: first_str(obj, &["content", "content_with_weight"]).unwrap_or_default(),
            document_id: first_str(obj, &["document_id", "doc_id"]).unwrap_or_default(),
            document_name: first_str(obj, &["document_keyword", "docnm_kwd", "document_name"])
                .unwrap_or_default(),
            dataset_id: first_str(obj, &["dataset_id", "kb_id"]).unwrap_or_default(),
            similarity: score(obj.get("similarity")),
            vector_similarity: score(obj.get("vector_similarity")),
            term_similarity: score(obj.get("term_similarity")),
            positions: obj
                .get("positions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            keywords: obj
                .get("important_keywords")
                .or_else(|| obj.get("keywords"))
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            highlight: first_str(obj, &["highlight"]).filter(|h| !h.is_empty()),
        })
    }
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Missing, non-numeric and non-finite scores count as 0.
fn score(value: Option<&Value>) -> f64 {
    value
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

/// Per-document hit count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocAggregate {
    pub doc_id: String,
    pub doc_name: String,
    pub count: u64,
}

impl DocAggregate {
    fn from_backend(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            doc_id: first_str(obj, &["doc_id"])?,
            doc_name: first_str(obj, &["doc_name"]).unwrap_or_default(),
            count: obj.get("count").and_then(Value::as_u64).unwrap_or(0),
        })
    }
}

/// Result of one retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    /// In backend order; not necessarily sorted
    pub chunks: Vec<RetrievalChunk>,
    pub doc_aggs: Vec<DocAggregate>,
    pub total: u64,
}

impl RetrievalResponse {
    /// Normalize the `data` object of a retrieval reply.
    pub fn from_backend(data: &Value) -> Self {
        let raw_chunks = data
            .get("chunks")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut chunks = Vec::with_capacity(raw_chunks.len());
        for raw in raw_chunks {
            match RetrievalChunk::from_backend(raw) {
                Some(chunk) => chunks.push(chunk),
                None => tracing::warn!("Dropping retrieval chunk without an id"),
            }
        }

        let doc_aggs = data
            .get("doc_aggs")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(DocAggregate::from_backend).collect())
            .unwrap_or_default();

        let total = data
            .get("total")
            .and_then(Value::as_u64)
            .unwrap_or(chunks.len() as u64);

        Self {
            chunks,
            doc_aggs,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Tunable retrieval parameters. Out-of-range values are clamped when the
/// request is built, never rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub similarity_threshold: f64,
    pub vector_similarity_weight: f64,
    pub top_k: u32,
    pub page: u32,
    pub page_size: u32,
    pub document_ids: Vec<String>,
    pub keyword: bool,
    pub highlight: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            vector_similarity_weight: DEFAULT_VECTOR_SIMILARITY_WEIGHT,
            top_k: DEFAULT_TOP_K,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            document_ids: Vec::new(),
            keyword: false,
            highlight: false,
        }
    }
}

impl RetrievalOptions {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self {
            similarity_threshold: settings.similarity_threshold,
            vector_similarity_weight: settings.vector_similarity_weight,
            top_k: settings.top_k,
            page_size: settings.page_size,
            ..Self::default()
        }
    }

    /// Copy with every numeric field forced into its valid range.
    pub fn clamped(&self) -> Self {
        Self {
            similarity_threshold: unit(self.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD),
            vector_similarity_weight: unit(
                self.vector_similarity_weight,
                DEFAULT_VECTOR_SIMILARITY_WEIGHT,
            ),
            top_k: self.top_k.clamp(1, MAX_TOP_K),
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
            ..self.clone()
        }
    }

    /// JSON body for `POST /api/v1/retrieval`.
    pub fn to_body(&self, question: &str, dataset_ids: &[String]) -> Value {
        let opts = self.clamped();
        let mut body = serde_json::json!({
            "question": question,
            "dataset_ids": dataset_ids,
            "similarity_threshold": opts.similarity_threshold,
            "vector_similarity_weight": opts.vector_similarity_weight,
            "top_k": opts.top_k,
            "page": opts.page,
            "page_size": opts.page_size,
        });

        if let Some(map) = body.as_object_mut() {
            if !opts.document_ids.is_empty() {
                map.insert("document_ids".to_string(), serde_json::json!(opts.document_ids));
            }
            if opts.keyword {
                map.insert("keyword".to_string(), Value::Bool(true));
            }
            if opts.highlight {
                map.insert("highlight".to_string(), Value::Bool(true));
            }
        }

        body
    }
}

// NaN cannot be clamped meaningfully, so it falls back to the default.
fn unit(value: f64, default: f64) -> f64 {
    if value.is_nan() {
        default
    } else {
        value.clamp(0.0, 1.0)
    }
}
