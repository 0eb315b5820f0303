//! Search and answer value types.
//!
//! These are produced by backend clients and consumed by the orchestrator's
//! merge step. All of them are plain immutable values.

use serde::{Deserialize, Serialize};

/// One retrieved document reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,

    /// Source URI (may be empty when the backend does not expose one)
    pub uri: String,

    /// Short evidence text
    pub snippet: String,

    /// Backend that produced this result
    pub backend_id: String,

    /// Relevance score if the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,

    /// Position within the backend's own result page
    pub rank: usize,
}

/// A citation attached to a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Backend-assigned conversation identifiers, passed back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
}

impl SessionHint {
    pub fn new(session: Option<String>, query_id: Option<String>) -> Self {
        Self { session, query_id }
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_none() && self.query_id.is_none()
    }

    /// Fill missing fields from `other`.
    pub fn or(self, other: &SessionHint) -> SessionHint {
        SessionHint {
            session: self.session.or_else(|| other.session.clone()),
            query_id: self.query_id.or_else(|| other.query_id.clone()),
        }
    }
}

/// Result of the search step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,

    /// Identifiers the answer step must reuse
    pub hint: SessionHint,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

/// Result of the answer step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub text: String,
    pub citations: Vec<Citation>,
    pub related_questions: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl AnswerResult {
    /// An answer is usable only if its text is non-empty after trimming.
    pub fn is_usable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Where a backend's answer text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Produced by the backend's answer generation
    Generated,
    /// Synthesized locally from search snippets
    Snippets,
}

/// Combined search + answer outcome of one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendAnswer {
    pub backend_id: String,
    pub results: Vec<SearchResult>,
    pub answer: AnswerResult,
    pub source: AnswerSource,

    /// Identifiers to send on the next turn
    pub hint: SessionHint,
}
