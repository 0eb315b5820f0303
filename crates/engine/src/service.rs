//! One chat request, end to end.
//!
//! The cycle per request: lock the session, classify the query, fan it out
//! to the backends, escalate and notify on the first sensitive turn, then
//! record the turn and persist it. The session lock is held for the whole
//! cycle, and nothing in the session changes unless a turn is recorded.

use crate::classifier::{ClassificationResult, SensitiveQueryClassifier};
use crate::orchestrator::{AggregatedResponse, QueryOrchestrator};
use crate::session::{
    create_conversation_log, generate_session_id, ConversationLog, NoopConversationLog,
    SessionState, SessionStore,
};
use concierge_core::config::SessionConfig;
use concierge_core::{AppConfig, AppError, AppResult};
use concierge_notify::{
    create_notifier, dispatch, load_templates, HandoffNotifier, HandoffRecord, HistoryMessage,
    MessageTemplates,
};
use concierge_search::create_credential_cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Inbound chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub query: String,

    /// Existing session to continue; a new one is created when absent
    #[serde(default)]
    pub session_id: Option<String>,

    /// Chat history kept by the client, forwarded to agents on handoff
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
            history: Vec::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }
}

/// Result of one chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: String,

    pub answer: String,

    /// Text offering a human agent, set when this query was sensitive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_reply: Option<String>,

    pub response: AggregatedResponse,

    pub classification: ClassificationResult,

    pub consultant_needed: bool,

    pub state: SessionState,
}

/// Request-cycle glue over the orchestrator, classifier, sessions and
/// notifier.
pub struct ConciergeService {
    orchestrator: QueryOrchestrator,
    classifier: SensitiveQueryClassifier,
    sessions: SessionStore,
    notifier: Arc<dyn HandoffNotifier>,
    templates: MessageTemplates,
    log: Arc<dyn ConversationLog>,
    handoff_turns: usize,
}

impl ConciergeService {
    pub fn new(
        orchestrator: QueryOrchestrator,
        classifier: SensitiveQueryClassifier,
        notifier: Arc<dyn HandoffNotifier>,
    ) -> Self {
        let session_config = SessionConfig::default();
        Self {
            sessions: SessionStore::new(&session_config, classifier.threshold()),
            handoff_turns: session_config.handoff_turns,
            orchestrator,
            classifier,
            notifier,
            templates: MessageTemplates::default(),
            log: Arc::new(NoopConversationLog),
        }
    }

    /// Replace the session store with one built from `config`.
    pub fn with_session_config(mut self, config: &SessionConfig) -> Self {
        self.sessions = SessionStore::new(config, self.classifier.threshold());
        self.handoff_turns = config.handoff_turns;
        self
    }

    pub fn with_templates(mut self, templates: MessageTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn ConversationLog>) -> Self {
        self.log = log;
        self
    }

    /// Build every component from configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let credentials = create_credential_cache(config);
        let orchestrator = QueryOrchestrator::from_config(config, &credentials)?;
        let classifier = SensitiveQueryClassifier::from_config(config)?;

        let templates = match &config.notifier.templates_path {
            Some(path) => load_templates(&config.resolve_path(path))?,
            None => MessageTemplates::default(),
        };
        let notifier = create_notifier(config, templates.clone());
        let log = create_conversation_log(config)?;

        tracing::debug!(
            backends = orchestrator.backends().len(),
            notifier = notifier.name(),
            log = log.name(),
            "Concierge service ready"
        );

        Ok(Self::new(orchestrator, classifier, notifier)
            .with_session_config(&config.session)
            .with_templates(templates)
            .with_log(log))
    }

    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    pub fn classifier(&self) -> &SensitiveQueryClassifier {
        &self.classifier
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }

    /// Reset a session's handoff flag. Administrative only.
    pub async fn clear_handoff(&self, session_id: &str) -> AppResult<()> {
        self.sessions.clear_handoff(session_id).await
    }

    /// Run one chat request.
    ///
    /// Per-backend failures end up in the response's report map; only
    /// `AuthUnavailable` is returned as an error.
    pub async fn handle(&self, request: ChatRequest) -> AppResult<ChatResponse> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(AppError::Other("Query must not be empty".to_string()));
        }

        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_session_id);

        let span = tracing::info_span!("chat", session_id = %session_id);
        self.run_cycle(session_id, query, request.history)
            .instrument(span)
            .await
    }

    async fn run_cycle(
        &self,
        session_id: String,
        query: String,
        history: Vec<HistoryMessage>,
    ) -> AppResult<ChatResponse> {
        let mut session = self.sessions.lock(&session_id).await;

        let classification = self.classifier.classify(&query);
        let sensitive = self.classifier.requires_handoff(&classification);

        // A failed fan-out leaves the session untouched
        let mut response = self
            .orchestrator
            .run_with_hints(&query, session.backend_hints())
            .await?;

        if sensitive && session.escalate() {
            let record = HandoffRecord::new(
                session_id.clone(),
                query.clone(),
                classification.categories.clone(),
                classification.confidence,
            )
            .with_recent_turns(session.recent_turns(self.handoff_turns))
            .with_history(history);

            tracing::info!(
                categories = ?classification.categories,
                confidence = classification.confidence,
                "Session escalated, dispatching handoff"
            );
            dispatch(Arc::clone(&self.notifier), record);
        }
        response.consultant_needed = sensitive || session.handoff_requested();

        let threshold = self.sessions.threshold();
        let turn = session
            .append_turn(query, response, classification, threshold)
            .clone();
        let state = session.state();

        if let Err(e) = self.log.append(&session_id, &turn).await {
            tracing::warn!("Failed to persist turn {}: {}", turn.seq, e);
        }
        drop(session);

        let handoff_reply =
            sensitive.then(|| self.templates.handoff_reply(&turn.classification.categories));

        tracing::info!(
            seq = turn.seq,
            consultant_needed = turn.response.consultant_needed,
            degraded = turn.response.degraded,
            "Turn recorded"
        );

        Ok(ChatResponse {
            session_id,
            answer: turn.response.answer.clone(),
            handoff_reply,
            consultant_needed: turn.response.consultant_needed,
            response: turn.response,
            classification: turn.classification,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{AggregateOptions, BackendHandle};
    use concierge_core::BackendConfig;
    use concierge_notify::{LogNotifier, SensitiveCategory};
    use concierge_search::MockBackend;

    fn service() -> ConciergeService {
        let backends = vec![BackendHandle::new(
            BackendConfig::new("faq"),
            Arc::new(MockBackend::canned("faq")),
        )];
        ConciergeService::new(
            QueryOrchestrator::new(backends, AggregateOptions::default()),
            SensitiveQueryClassifier::with_default_rules(0.5).unwrap(),
            Arc::new(LogNotifier::new(MessageTemplates::default(), 500)),
        )
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let err = service().handle(ChatRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, AppError::Other(_)));
    }

    #[tokio::test]
    async fn test_generates_session_id_when_absent() {
        let service = service();
        let response = service
            .handle(ChatRequest::new("사용 방법 알려주세요"))
            .await
            .unwrap();

        assert!(response.session_id.starts_with("session_"));
        assert_eq!(response.state, SessionState::Active);
        assert!(response.handoff_reply.is_none());
        assert!(!response.consultant_needed);
    }

    #[tokio::test]
    async fn test_blank_session_id_is_replaced() {
        let response = service()
            .handle(ChatRequest::new("안녕하세요").with_session(" "))
            .await
            .unwrap();
        assert!(response.session_id.starts_with("session_"));
    }

    #[tokio::test]
    async fn test_sensitive_query_gets_handoff_reply() {
        let service = service();
        let response = service
            .handle(ChatRequest::new("할인 쿠폰 있나요?").with_session("s1"))
            .await
            .unwrap();

        assert!(response.consultant_needed);
        assert_eq!(response.state, SessionState::Escalated);
        let expected = service
            .templates()
            .handoff_reply(&response.classification.categories);
        assert_eq!(response.handoff_reply.as_deref(), Some(expected.as_str()));
        assert!(response
            .classification
            .categories
            .contains(&SensitiveCategory::Discount));
        assert!(!response.answer.is_empty());
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"query": "q", "sessionId": "s", "history": [{"role": "model", "text": "hi"}]}"#,
        )
        .unwrap();
        assert_eq!(request.session_id.as_deref(), Some("s"));
        assert_eq!(request.history, vec![HistoryMessage::assistant("hi")]);
    }
}
