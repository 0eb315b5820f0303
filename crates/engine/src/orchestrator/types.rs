//! Orchestrator input and output types.

use concierge_core::config::OrchestratorConfig;
use concierge_core::BackendConfig;
use concierge_search::{AnswerSource, Citation, SearchBackend, SearchResult, SessionHint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// A configured backend paired with its client.
#[derive(Clone)]
pub struct BackendHandle {
    pub config: BackendConfig,
    pub client: Arc<dyn SearchBackend>,
}

impl BackendHandle {
    pub fn new(config: BackendConfig, client: Arc<dyn SearchBackend>) -> Self {
        Self { config, client }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("id", &self.config.id)
            .field("kind", &self.client.kind())
            .field("priority", &self.config.priority)
            .finish()
    }
}

/// Per-call settings for one fan-out.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Budget shared by every backend call
    pub deadline: Duration,

    pub max_search_results: usize,

    pub max_related_questions: usize,

    /// Answer text of a degraded response
    pub fallback_answer: String,

    /// Backend session identifiers from the previous turn, by backend id
    pub hints: HashMap<String, SessionHint>,
}

impl AggregateOptions {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            deadline: config.deadline(),
            max_search_results: config.max_search_results,
            max_related_questions: config.max_related_questions,
            fallback_answer: config.fallback_answer.clone(),
            hints: HashMap::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_hints(mut self, hints: HashMap<String, SessionHint>) -> Self {
        self.hints = hints;
        self
    }
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

/// Outcome class of one backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Success,
    Timeout,
    Error,
    AuthUnavailable,
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendStatus::Success => "success",
            BackendStatus::Timeout => "timeout",
            BackendStatus::Error => "error",
            BackendStatus::AuthUnavailable => "auth_unavailable",
        };
        f.write_str(name)
    }
}

/// What happened to one backend during a fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendReport {
    pub status: BackendStatus,

    pub latency_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Backend session identifiers to reuse on the next turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<SessionHint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_source: Option<AnswerSource>,
}

impl BackendReport {
    pub fn is_success(&self) -> bool {
        self.status == BackendStatus::Success
    }
}

/// Provenance of the merged answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Backend whose answer was chosen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_by: Option<String>,

    /// The primary backend failed and another one answered
    pub used_fallback: bool,

    /// The chosen answer was synthesized from snippets
    pub synthesized_answer: bool,
}

/// Merged result of one fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub search_results: Vec<SearchResult>,
    pub related_questions: Vec<String>,

    /// One entry per backend that was called
    pub backends: BTreeMap<String, BackendReport>,

    pub consultant_needed: bool,

    /// No backend produced a usable answer
    pub degraded: bool,

    pub metadata: ResponseMetadata,
}

impl AggregatedResponse {
    /// Ids of backends that succeeded, in id order.
    pub fn successful_backends(&self) -> Vec<&str> {
        self.backends
            .iter()
            .filter(|(_, report)| report.is_success())
            .map(|(id, _)| id.as_str())
            .collect()
    }
}
