//! Scripted backend for tests and offline runs.
//!
//! Returns canned results after an optional delay, or fails on demand. The
//! delay uses `tokio::time::sleep`, so tests can run it under a paused clock.

use crate::client::SearchBackend;
use crate::types::{AnswerResult, Citation, SearchPage, SearchResult, SessionHint};
use concierge_core::{AppError, AppResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Failure {
    Backend(String),
    Auth,
}

impl Failure {
    fn to_error(&self, backend_id: &str) -> AppError {
        match self {
            Failure::Backend(message) => AppError::backend(backend_id, message.clone()),
            Failure::Auth => AppError::AuthUnavailable("mock credential failure".to_string()),
        }
    }
}

/// Mock search backend.
#[derive(Debug)]
pub struct MockBackend {
    id: String,
    results: Vec<SearchResult>,
    answer: String,
    citations: Vec<Citation>,
    related: Vec<String>,
    session: Option<String>,
    delay: Duration,
    search_failure: Option<Failure>,
    answer_failure: Option<Failure>,
    echo: bool,
    search_calls: AtomicUsize,
    answer_calls: AtomicUsize,
}

impl MockBackend {
    /// Create a mock that returns nothing until configured.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            results: Vec::new(),
            answer: String::new(),
            citations: Vec::new(),
            related: Vec::new(),
            session: None,
            delay: Duration::ZERO,
            search_failure: None,
            answer_failure: None,
            echo: false,
            search_calls: AtomicUsize::new(0),
            answer_calls: AtomicUsize::new(0),
        }
    }

    /// Mock used for `kind: mock` backends in configuration.
    ///
    /// Answers every query with one result and an answer echoing the query.
    pub fn canned(id: impl Into<String>) -> Self {
        let mut mock = Self::new(id);
        mock.echo = true;
        mock
    }

    pub fn with_result(
        mut self,
        title: impl Into<String>,
        uri: impl Into<String>,
        snippet: impl Into<String>,
        relevance_score: Option<f32>,
    ) -> Self {
        let rank = self.results.len();
        self.results.push(SearchResult {
            title: title.into(),
            uri: uri.into(),
            snippet: snippet.into(),
            backend_id: self.id.clone(),
            relevance_score,
            rank,
        });
        self
    }

    pub fn with_answer(mut self, text: impl Into<String>) -> Self {
        self.answer = text.into();
        self
    }

    pub fn with_citation(mut self, title: impl Into<String>, uri: impl Into<String>) -> Self {
        self.citations.push(Citation {
            title: title.into(),
            uri: uri.into(),
            snippet: None,
        });
        self
    }

    pub fn with_related(mut self, question: impl Into<String>) -> Self {
        self.related.push(question.into());
        self
    }

    /// Session name returned from the search step.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Delay applied to both steps.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_search(mut self, message: impl Into<String>) -> Self {
        self.search_failure = Some(Failure::Backend(message.into()));
        self
    }

    pub fn failing_answer(mut self, message: impl Into<String>) -> Self {
        self.answer_failure = Some(Failure::Backend(message.into()));
        self
    }

    /// Fail the search step as if no credential could be obtained.
    pub fn auth_failure(mut self) -> Self {
        self.search_failure = Some(Failure::Auth);
        self
    }

    pub fn auth_failure_on_answer(mut self) -> Self {
        self.answer_failure = Some(Failure::Auth);
        self
    }

    /// Number of search calls received.
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Number of answer calls received.
    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for MockBackend {
    fn backend_id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str, hint: &SessionHint) -> AppResult<SearchPage> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(failure) = &self.search_failure {
            return Err(failure.to_error(&self.id));
        }

        let mut results = self.results.clone();
        if self.echo && results.is_empty() {
            results.push(SearchResult {
                title: format!("{} 안내", self.id),
                uri: format!("mock://{}/1", self.id),
                snippet: format!("'{}'에 대한 {} 문서입니다.", query, self.id),
                backend_id: self.id.clone(),
                relevance_score: Some(0.5),
                rank: 0,
            });
        }

        let calls = self.search_calls();
        let session = hint.session.clone().or_else(|| self.session.clone());
        Ok(SearchPage {
            total_size: Some(results.len() as u64),
            results,
            hint: SessionHint::new(session, Some(format!("{}-q{}", self.id, calls))),
        })
    }

    async fn answer(&self, query: &str, hint: &SessionHint) -> AppResult<AnswerResult> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(failure) = &self.answer_failure {
            return Err(failure.to_error(&self.id));
        }

        let text = if self.echo && self.answer.is_empty() {
            format!("[{}] {}", self.id, query)
        } else {
            self.answer.clone()
        };

        Ok(AnswerResult {
            text,
            citations: self.citations.clone(),
            related_questions: self.related.clone(),
            query_id: hint.query_id.clone(),
            session: hint.session.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_configured_results() {
        let mock = MockBackend::new("faq")
            .with_result("A", "https://a", "snippet a", Some(0.4))
            .with_result("B", "https://b", "snippet b", None)
            .with_session("sessions/s1");

        let page = mock.search("q", &SessionHint::default()).await.unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[1].rank, 1);
        assert_eq!(page.results[1].backend_id, "faq");
        assert_eq!(page.hint.session.as_deref(), Some("sessions/s1"));
        assert_eq!(mock.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_canned_mock_echoes_query() {
        let mock = MockBackend::canned("demo");
        let page = mock.search("환불", &SessionHint::default()).await.unwrap();
        let answer = mock.answer("환불", &page.hint).await.unwrap();

        assert_eq!(page.results.len(), 1);
        assert!(answer.text.contains("환불"));
        assert!(answer.is_usable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_delay_uses_tokio_clock() {
        let mock = MockBackend::new("slow").with_delay(Duration::from_secs(30));
        let start = tokio::time::Instant::now();
        mock.search("q", &SessionHint::default()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let mock = MockBackend::new("x").failing_search("boom");
        assert!(matches!(
            mock.search("q", &SessionHint::default()).await,
            Err(AppError::Backend { .. })
        ));

        let mock = MockBackend::new("y").auth_failure();
        assert!(mock
            .search("q", &SessionHint::default())
            .await
            .unwrap_err()
            .is_auth_unavailable());
    }
}
