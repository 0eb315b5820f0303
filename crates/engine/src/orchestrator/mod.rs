//! Concurrent fan-out over the configured backends.
//!
//! Every enabled backend gets one combined search+answer call. All calls
//! share one deadline and each also has its own timeout; a call that misses
//! either is dropped and reported as `timeout`. Merging happens only after
//! every call has finished or been cut off, so completion order never shows
//! up in the response.

pub mod merge;
pub mod types;

pub use merge::{primary_backend, BackendOutcome};
pub use types::{
    AggregateOptions, AggregatedResponse, BackendHandle, BackendReport, BackendStatus,
    ResponseMetadata,
};

use concierge_core::{AppConfig, AppError, AppResult};
use concierge_search::{create_backends, search_and_answer, CredentialCache, SessionHint};
use futures::future::join_all;
use std::collections::HashMap;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;

/// Fan out one query to `backends` and merge the outcomes.
///
/// Disabled backends are skipped and do not appear in the report map.
pub async fn aggregate(
    query: &str,
    backends: &[BackendHandle],
    options: &AggregateOptions,
) -> AppResult<AggregatedResponse> {
    let enabled: Vec<&BackendHandle> = backends.iter().filter(|b| b.config.enabled).collect();
    let deadline = Instant::now() + options.deadline;

    let calls = enabled.iter().map(|backend| {
        let span = tracing::info_span!("backend", id = %backend.config.id);
        async move {
            let started = Instant::now();
            let call_deadline = deadline.min(started + backend.config.timeout());
            let hint = options
                .hints
                .get(&backend.config.id)
                .cloned()
                .unwrap_or_default();

            let result = match timeout_at(
                call_deadline,
                search_and_answer(backend.client.as_ref(), query, &hint),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::BackendTimeout {
                    backend: backend.config.id.clone(),
                }),
            };

            let latency = started.elapsed();
            match &result {
                Ok(answer) => tracing::debug!(
                    "Backend answered in {}ms ({} results)",
                    latency.as_millis(),
                    answer.results.len()
                ),
                Err(e) => tracing::warn!("Backend failed after {}ms: {}", latency.as_millis(), e),
            }

            BackendOutcome {
                config: backend.config.clone(),
                result,
                latency,
            }
        }
        .instrument(span)
    });

    let outcomes = join_all(calls).await;

    let primary = enabled
        .iter()
        .find(|b| b.config.primary)
        .map(|b| b.config.id.as_str());

    let response = merge::merge(&outcomes, primary, options)?;

    tracing::info!(
        backends = outcomes.len(),
        succeeded = response.successful_backends().len(),
        degraded = response.degraded,
        "Fan-out complete"
    );

    Ok(response)
}

/// Holds the backend set and default options for repeated fan-outs.
#[derive(Debug, Clone)]
pub struct QueryOrchestrator {
    backends: Vec<BackendHandle>,
    options: AggregateOptions,
}

impl QueryOrchestrator {
    pub fn new(backends: Vec<BackendHandle>, options: AggregateOptions) -> Self {
        Self { backends, options }
    }

    /// Build clients for every enabled backend in the configuration.
    pub fn from_config(config: &AppConfig, credentials: &CredentialCache) -> AppResult<Self> {
        let backends = create_backends(config, credentials)?
            .into_iter()
            .map(|(config, client)| BackendHandle::new(config, client))
            .collect();
        Ok(Self::new(
            backends,
            AggregateOptions::from_config(&config.orchestrator),
        ))
    }

    pub fn backends(&self) -> &[BackendHandle] {
        &self.backends
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    /// Run one fan-out with the default options.
    pub async fn run(&self, query: &str) -> AppResult<AggregatedResponse> {
        aggregate(query, &self.backends, &self.options).await
    }

    /// Run one fan-out, reusing backend session identifiers.
    pub async fn run_with_hints(
        &self,
        query: &str,
        hints: HashMap<String, SessionHint>,
    ) -> AppResult<AggregatedResponse> {
        let options = self.options.clone().with_hints(hints);
        aggregate(query, &self.backends, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::BackendConfig;
    use concierge_search::MockBackend;
    use std::sync::Arc;
    use std::time::Duration;

    fn handle(config: BackendConfig, mock: MockBackend) -> BackendHandle {
        BackendHandle::new(config, Arc::new(mock))
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_backend_not_called() {
        let mock = Arc::new(MockBackend::new("off").with_result("t", "u", "s", None));
        let mut config = BackendConfig::new("off").with_kind("mock");
        config.enabled = false;
        let backends = vec![
            BackendHandle::new(config, mock.clone()),
            handle(
                BackendConfig::new("on").with_kind("mock"),
                MockBackend::canned("on"),
            ),
        ];

        let response = aggregate("q", &backends, &AggregateOptions::default())
            .await
            .unwrap();

        assert_eq!(mock.search_calls(), 0);
        assert!(!response.backends.contains_key("off"));
        assert!(response.backends["on"].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_timeout_shorter_than_deadline() {
        let backends = vec![
            handle(
                BackendConfig::new("fast").with_timeout(Duration::from_secs(1)),
                MockBackend::canned("fast").with_delay(Duration::from_millis(100)),
            ),
            handle(
                BackendConfig::new("slow").with_timeout(Duration::from_secs(1)),
                MockBackend::canned("slow").with_delay(Duration::from_secs(3)),
            ),
        ];

        let start = Instant::now();
        let response = aggregate("q", &backends, &AggregateOptions::default())
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(response.backends["slow"].status, BackendStatus::Timeout);
        assert!(response.backends["fast"].is_success());
        assert!(!response.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_priority_answer_goes_to_faster_backend() {
        let backends = vec![
            handle(
                BackendConfig::new("a").with_priority(1),
                MockBackend::canned("a").with_delay(Duration::from_millis(900)),
            ),
            handle(
                BackendConfig::new("b").with_priority(1),
                MockBackend::canned("b").with_delay(Duration::from_millis(10)),
            ),
        ];

        let response = aggregate("q", &backends, &AggregateOptions::default())
            .await
            .unwrap();

        assert_eq!(response.metadata.answered_by.as_deref(), Some("b"));
        assert!(!response.metadata.used_fallback);
        assert!(response.backends["a"].latency_ms > response.backends["b"].latency_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flagged_primary_beats_faster_peer() {
        let backends = vec![
            handle(
                BackendConfig::new("a").with_priority(1).as_primary(),
                MockBackend::canned("a").with_delay(Duration::from_millis(900)),
            ),
            handle(
                BackendConfig::new("b").with_priority(1),
                MockBackend::canned("b").with_delay(Duration::from_millis(10)),
            ),
        ];

        let response = aggregate("q", &backends, &AggregateOptions::default())
            .await
            .unwrap();

        assert_eq!(response.metadata.answered_by.as_deref(), Some("a"));
        assert!(!response.metadata.used_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hints_are_passed_to_backends() {
        let backends = vec![handle(
            BackendConfig::new("faq"),
            MockBackend::canned("faq"),
        )];
        let mut hints = HashMap::new();
        hints.insert(
            "faq".to_string(),
            SessionHint::new(Some("sessions/prev".to_string()), None),
        );

        let orchestrator = QueryOrchestrator::new(backends, AggregateOptions::default());
        let response = orchestrator.run_with_hints("q", hints).await.unwrap();

        let hint = response.backends["faq"].hint.clone().unwrap();
        assert_eq!(hint.session.as_deref(), Some("sessions/prev"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config_builds_mock_backends() {
        let mut config = AppConfig::default();
        config.backends = vec![BackendConfig::new("demo").with_kind("mock")];
        let credentials = concierge_search::create_credential_cache(&config);

        let orchestrator = QueryOrchestrator::from_config(&config, &credentials).unwrap();
        assert_eq!(orchestrator.backends().len(), 1);

        let response = orchestrator.run("안녕하세요").await.unwrap();
        assert_eq!(response.metadata.answered_by.as_deref(), Some("demo"));
    }
}
