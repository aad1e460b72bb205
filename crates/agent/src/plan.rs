//! Parsing of classifier and grader replies, and query selection.

use ragent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// How the classifier sees the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Simple,
    Vague,
    MultiPart,
}

impl QuestionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "simple" => Some(Self::Simple),
            "vague" => Some(Self::Vague),
            "multi_part" | "multipart" => Some(Self::MultiPart),
            _ => None,
        }
    }
}

/// Parsed classifier output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub kind: QuestionKind,
    pub rewritten: Option<String>,
    pub sub_queries: Vec<String>,
}

impl QueryPlan {
    /// Plan used when classification is unavailable.
    pub fn simple() -> Self {
        Self {
            kind: QuestionKind::Simple,
            rewritten: None,
            sub_queries: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct ClassifyReply {
    kind: String,
    #[serde(default)]
    rewritten: Option<String>,
    #[serde(default)]
    sub_queries: Option<Vec<String>>,
}

/// What the first pass retrieves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QueryInput {
    SubQueries(Vec<String>),
    Rewritten(String),
    Question(String),
}

impl QueryInput {
    /// Choose the input with fixed priority: sub-queries of a multi-part
    /// question, then the rewrite of a non-simple question, then the
    /// question itself.
    pub fn from_plan(plan: &QueryPlan, question: &str) -> Self {
        let sub_queries = clean_queries(&plan.sub_queries);
        if plan.kind == QuestionKind::MultiPart && !sub_queries.is_empty() {
            return Self::SubQueries(sub_queries);
        }

        if plan.kind != QuestionKind::Simple {
            if let Some(rewritten) = plan.rewritten.as_deref().map(str::trim) {
                if !rewritten.is_empty() {
                    return Self::Rewritten(rewritten.to_string());
                }
            }
        }

        Self::Question(question.trim().to_string())
    }

    pub fn queries(&self) -> Vec<String> {
        match self {
            Self::SubQueries(queries) => queries.clone(),
            Self::Rewritten(query) | Self::Question(query) => vec![query.clone()],
        }
    }

    pub fn is_decomposed(&self) -> bool {
        matches!(self, Self::SubQueries(_))
    }
}

/// Parsed grader output.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GradeVerdict {
    pub sufficient: bool,
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

/// Trimmed, non-blank queries with exact repeats removed, order kept.
pub fn clean_queries(queries: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(queries.len());
    for query in queries.iter().map(|q| q.trim()) {
        if !query.is_empty() && !out.iter().any(|q| q == query) {
            out.push(query.to_string());
        }
    }
    out
}

/// The JSON object inside a model reply, tolerating code fences and
/// surrounding prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn parse_plan(text: &str) -> AppResult<QueryPlan> {
    let json = extract_json_object(text)
        .ok_or_else(|| AppError::Agent("classifier reply contains no JSON object".to_string()))?;
    let reply: ClassifyReply = serde_json::from_str(json)?;

    let kind = QuestionKind::parse(&reply.kind)
        .ok_or_else(|| AppError::Agent(format!("unknown question kind: {}", reply.kind)))?;

    Ok(QueryPlan {
        kind,
        rewritten: reply.rewritten,
        sub_queries: reply.sub_queries.unwrap_or_default(),
    })
}

pub fn parse_verdict(text: &str) -> AppResult<GradeVerdict> {
    let json = extract_json_object(text)
        .ok_or_else(|| AppError::Agent("grader reply contains no JSON object".to_string()))?;
    let mut verdict: GradeVerdict = serde_json::from_str(json)?;
    verdict.follow_up_queries = clean_queries(&verdict.follow_up_queries);
    Ok(verdict)
}
