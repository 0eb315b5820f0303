//! Deterministic merge of per-backend outcomes.
//!
//! Nothing here depends on the order in which backends finished. Ordering is
//! always derived from configuration (priority, id) and result fields.

use super::types::{
    AggregateOptions, AggregatedResponse, BackendReport, BackendStatus, ResponseMetadata,
};
use concierge_core::{AppError, AppResult, BackendConfig};
use concierge_search::{AnswerSource, BackendAnswer, SearchResult};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Result of calling one backend.
#[derive(Debug)]
pub struct BackendOutcome {
    pub config: BackendConfig,
    pub result: AppResult<BackendAnswer>,
    pub latency: Duration,
}

struct Success<'a> {
    config: &'a BackendConfig,
    answer: &'a BackendAnswer,
    latency: Duration,
}

/// The backend explicitly flagged `primary`, if any.
///
/// Without a flag no single backend is preferred; the answer goes to the best
/// success by priority, then latency, then id.
pub fn primary_backend(backends: &[BackendConfig]) -> Option<&BackendConfig> {
    backends.iter().find(|b| b.primary)
}

/// Merge outcomes into one response.
///
/// Returns `AuthUnavailable` only when at least one backend was called and
/// every one of them failed for lack of credentials.
pub fn merge(
    outcomes: &[BackendOutcome],
    primary_id: Option<&str>,
    options: &AggregateOptions,
) -> AppResult<AggregatedResponse> {
    let backends: BTreeMap<String, BackendReport> = outcomes
        .iter()
        .map(|o| (o.config.id.clone(), report_for(o)))
        .collect();

    if !outcomes.is_empty()
        && backends
            .values()
            .all(|r| r.status == BackendStatus::AuthUnavailable)
    {
        return Err(AppError::AuthUnavailable(format!(
            "no credentials for any of {} backend(s)",
            outcomes.len()
        )));
    }

    let mut successes: Vec<Success<'_>> = outcomes
        .iter()
        .filter_map(|o| match &o.result {
            Ok(answer) => Some(Success {
                config: &o.config,
                answer,
                latency: o.latency,
            }),
            Err(_) => None,
        })
        .collect();

    if successes.is_empty() {
        tracing::warn!("No backend produced a usable answer; returning degraded response");
        return Ok(AggregatedResponse {
            answer: options.fallback_answer.clone(),
            citations: Vec::new(),
            search_results: Vec::new(),
            related_questions: Vec::new(),
            backends,
            consultant_needed: false,
            degraded: true,
            metadata: ResponseMetadata::default(),
        });
    }

    // Configuration order: priority desc, then id.
    successes.sort_by(|a, b| {
        b.config
            .priority
            .cmp(&a.config.priority)
            .then_with(|| a.config.id.cmp(&b.config.id))
    });

    let chosen = choose_answer(&successes, primary_id);

    // Unflagged: a fallback means no top-priority backend succeeded.
    let used_fallback = match primary_id {
        Some(primary) => chosen.config.id != primary,
        None => outcomes
            .iter()
            .map(|o| o.config.priority)
            .max()
            .is_some_and(|top| chosen.config.priority < top),
    };

    Ok(AggregatedResponse {
        answer: chosen.answer.answer.text.clone(),
        citations: chosen.answer.answer.citations.clone(),
        search_results: merge_search_results(&successes, options.max_search_results),
        related_questions: merge_related_questions(&successes, options.max_related_questions),
        backends,
        consultant_needed: false,
        degraded: false,
        metadata: ResponseMetadata {
            answered_by: Some(chosen.config.id.clone()),
            used_fallback,
            synthesized_answer: chosen.answer.source == AnswerSource::Snippets,
        },
    })
}

fn report_for(outcome: &BackendOutcome) -> BackendReport {
    let latency_ms = outcome.latency.as_millis() as u64;
    match &outcome.result {
        Ok(answer) => BackendReport {
            status: BackendStatus::Success,
            latency_ms,
            error: None,
            hint: if answer.hint.is_empty() {
                None
            } else {
                Some(answer.hint.clone())
            },
            answer_source: Some(answer.source),
        },
        Err(e) => BackendReport {
            status: match e {
                AppError::AuthUnavailable(_) => BackendStatus::AuthUnavailable,
                AppError::BackendTimeout { .. } => BackendStatus::Timeout,
                _ => BackendStatus::Error,
            },
            latency_ms,
            error: Some(e.to_string()),
            hint: None,
            answer_source: None,
        },
    }
}

/// The flagged primary's answer if it succeeded, else the best success by
/// priority, then latency, then id.
fn choose_answer<'a, 'b>(successes: &'b [Success<'a>], primary_id: Option<&str>) -> &'b Success<'a> {
    if let Some(primary) = primary_id {
        if let Some(found) = successes.iter().find(|s| s.config.id == primary) {
            return found;
        }
    }

    let mut best = &successes[0];
    for candidate in &successes[1..] {
        let better = candidate
            .config
            .priority
            .cmp(&best.config.priority)
            .then_with(|| best.latency.cmp(&candidate.latency))
            .then_with(|| best.config.id.cmp(&candidate.config.id));
        if better == Ordering::Greater {
            best = candidate;
        }
    }
    best
}

/// Union of all successful results, ranked, deduplicated and capped.
fn merge_search_results(successes: &[Success<'_>], cap: usize) -> Vec<SearchResult> {
    let mut ranked: Vec<(i32, &SearchResult)> = successes
        .iter()
        .flat_map(|s| s.answer.results.iter().map(move |r| (s.config.priority, r)))
        .collect();

    ranked.sort_by(|(pa, a), (pb, b)| {
        pb.cmp(pa)
            .then_with(|| compare_relevance(a.relevance_score, b.relevance_score))
            .then_with(|| a.backend_id.cmp(&b.backend_id))
            .then_with(|| a.rank.cmp(&b.rank))
    });

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|(_, r)| {
            let key = normalize_uri(&r.uri);
            key.is_empty() || seen.insert(key)
        })
        .map(|(_, r)| r.clone())
        .take(cap)
        .collect()
}

/// Higher scores first; results without a score go last.
fn compare_relevance(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn normalize_uri(uri: &str) -> String {
    uri.trim().trim_end_matches('/').to_lowercase()
}

fn merge_related_questions(successes: &[Success<'_>], cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    successes
        .iter()
        .flat_map(|s| s.answer.answer.related_questions.iter())
        .filter(|q| {
            let key = normalize_question(q);
            !key.is_empty() && seen.insert(key)
        })
        .map(|q| q.trim().to_string())
        .take(cap)
        .collect()
}

fn normalize_question(question: &str) -> String {
    question
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_search::{AnswerResult, Citation, SessionHint};

    fn result(backend: &str, uri: &str, score: Option<f32>, rank: usize) -> SearchResult {
        SearchResult {
            title: format!("{} #{}", backend, rank),
            uri: uri.to_string(),
            snippet: String::new(),
            backend_id: backend.to_string(),
            relevance_score: score,
            rank,
        }
    }

    fn success(
        id: &str,
        priority: i32,
        latency_ms: u64,
        results: Vec<SearchResult>,
        related: &[&str],
    ) -> BackendOutcome {
        BackendOutcome {
            config: BackendConfig::new(id).with_priority(priority),
            result: Ok(BackendAnswer {
                backend_id: id.to_string(),
                results,
                answer: AnswerResult {
                    text: format!("answer from {}", id),
                    citations: vec![Citation {
                        title: id.to_string(),
                        uri: format!("https://{}.example.com", id),
                        snippet: None,
                    }],
                    related_questions: related.iter().map(|q| q.to_string()).collect(),
                    query_id: None,
                    session: Some(format!("sessions/{}", id)),
                },
                source: AnswerSource::Generated,
                hint: SessionHint::new(Some(format!("sessions/{}", id)), None),
            }),
            latency: Duration::from_millis(latency_ms),
        }
    }

    fn failure(id: &str, error: AppError) -> BackendOutcome {
        BackendOutcome {
            config: BackendConfig::new(id),
            result: Err(error),
            latency: Duration::from_millis(10),
        }
    }

    fn failure_with_priority(id: &str, priority: i32) -> BackendOutcome {
        BackendOutcome {
            config: BackendConfig::new(id).with_priority(priority),
            result: Err(AppError::backend(id, "HTTP 502")),
            latency: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_results_ranked_by_priority_then_relevance() {
        let outcomes = vec![
            success(
                "low",
                1,
                10,
                vec![result("low", "https://x/1", Some(0.99), 0)],
                &[],
            ),
            success(
                "high",
                5,
                50,
                vec![
                    result("high", "https://y/1", None, 0),
                    result("high", "https://y/2", Some(0.3), 1),
                    result("high", "https://y/3", Some(0.8), 2),
                ],
                &[],
            ),
        ];

        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        let uris: Vec<_> = merged.search_results.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(
            uris,
            vec!["https://y/3", "https://y/2", "https://y/1", "https://x/1"]
        );
        assert_eq!(merged.answer, "answer from high");
        assert_eq!(merged.metadata.answered_by.as_deref(), Some("high"));
    }

    #[test]
    fn test_duplicate_uris_keep_first_ranked() {
        let outcomes = vec![
            success("a", 2, 10, vec![result("a", "https://doc/1/", Some(0.5), 0)], &[]),
            success("b", 1, 10, vec![result("b", "HTTPS://DOC/1", Some(0.9), 0)], &[]),
        ];

        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        assert_eq!(merged.search_results.len(), 1);
        assert_eq!(merged.search_results[0].backend_id, "a");
    }

    #[test]
    fn test_results_capped() {
        let results = (0..8)
            .map(|i| result("a", &format!("https://a/{}", i), None, i))
            .collect();
        let outcomes = vec![success("a", 0, 10, results, &[])];

        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        assert_eq!(merged.search_results.len(), 5);
        assert_eq!(merged.search_results[4].rank, 4);
    }

    #[test]
    fn test_related_questions_deduplicated_and_capped() {
        let outcomes = vec![
            success("a", 2, 10, vec![], &["요금제 변경 방법은?", "해지 절차는?"]),
            success(
                "b",
                1,
                10,
                vec![],
                &["  요금제 변경 방법은 ", "환불 규정은?", "추가 질문?"],
            ),
        ];

        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        assert_eq!(
            merged.related_questions,
            vec!["요금제 변경 방법은?", "해지 절차는?", "환불 규정은?"]
        );
    }

    #[test]
    fn test_answer_ties_broken_by_latency_then_id() {
        let outcomes = vec![
            success("b", 1, 30, vec![], &[]),
            success("a", 1, 30, vec![], &[]),
            success("c", 1, 10, vec![], &[]),
        ];
        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        assert_eq!(merged.metadata.answered_by.as_deref(), Some("c"));

        let outcomes = vec![
            success("b", 1, 30, vec![], &[]),
            success("a", 1, 30, vec![], &[]),
        ];
        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        assert_eq!(merged.metadata.answered_by.as_deref(), Some("a"));
    }

    #[test]
    fn test_primary_answer_preferred_and_fallback_flagged() {
        let outcomes = vec![
            success("faq", 1, 10, vec![], &[]),
            success("manuals", 9, 10, vec![], &[]),
        ];
        let merged = merge(&outcomes, Some("faq"), &AggregateOptions::default()).unwrap();
        assert_eq!(merged.metadata.answered_by.as_deref(), Some("faq"));
        assert!(!merged.metadata.used_fallback);

        let outcomes = vec![
            failure("faq", AppError::backend("faq", "HTTP 500")),
            success("manuals", 9, 10, vec![], &[]),
        ];
        let merged = merge(&outcomes, Some("faq"), &AggregateOptions::default()).unwrap();
        assert_eq!(merged.metadata.answered_by.as_deref(), Some("manuals"));
        assert!(merged.metadata.used_fallback);
    }

    #[test]
    fn test_fallback_without_flag_is_relative_to_top_priority() {
        let outcomes = vec![
            failure_with_priority("a", 2),
            success("b", 2, 40, vec![], &[]),
            success("c", 1, 5, vec![], &[]),
        ];
        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        assert_eq!(merged.metadata.answered_by.as_deref(), Some("b"));
        assert!(!merged.metadata.used_fallback);

        let outcomes = vec![
            failure_with_priority("a", 2),
            failure_with_priority("b", 2),
            success("c", 1, 5, vec![], &[]),
        ];
        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        assert_eq!(merged.metadata.answered_by.as_deref(), Some("c"));
        assert!(merged.metadata.used_fallback);
    }

    #[test]
    fn test_all_failed_is_degraded() {
        let outcomes = vec![
            failure("a", AppError::BackendTimeout { backend: "a".into() }),
            failure("b", AppError::backend("b", "HTTP 503")),
            failure("c", AppError::AuthUnavailable("expired".into())),
        ];

        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        assert!(merged.degraded);
        assert_eq!(merged.answer, AggregateOptions::default().fallback_answer);
        assert!(merged.search_results.is_empty());
        assert_eq!(merged.backends["a"].status, BackendStatus::Timeout);
        assert_eq!(merged.backends["b"].status, BackendStatus::Error);
        assert_eq!(merged.backends["c"].status, BackendStatus::AuthUnavailable);
        assert!(merged.metadata.answered_by.is_none());
    }

    #[test]
    fn test_all_auth_failures_is_error() {
        let outcomes = vec![
            failure("a", AppError::AuthUnavailable("no token".into())),
            failure("b", AppError::AuthUnavailable("no token".into())),
        ];
        let err = merge(&outcomes, None, &AggregateOptions::default()).unwrap_err();
        assert!(err.is_auth_unavailable());
    }

    #[test]
    fn test_no_backends_is_degraded() {
        let merged = merge(&[], None, &AggregateOptions::default()).unwrap();
        assert!(merged.degraded);
        assert!(merged.backends.is_empty());
    }

    #[test]
    fn test_primary_backend_selection() {
        let flagged = vec![
            BackendConfig::new("a").with_priority(9),
            BackendConfig::new("b").with_priority(1).as_primary(),
        ];
        assert_eq!(primary_backend(&flagged).unwrap().id, "b");

        let unflagged = vec![
            BackendConfig::new("b").with_priority(3),
            BackendConfig::new("a").with_priority(3),
        ];
        assert!(primary_backend(&unflagged).is_none());
        assert!(primary_backend(&[]).is_none());
    }

    #[test]
    fn test_success_report_carries_hint() {
        let outcomes = vec![success("a", 0, 12, vec![], &[])];
        let merged = merge(&outcomes, None, &AggregateOptions::default()).unwrap();
        let report = &merged.backends["a"];
        assert_eq!(report.latency_ms, 12);
        assert_eq!(
            report.hint.as_ref().and_then(|h| h.session.as_deref()),
            Some("sessions/a")
        );
    }
}
