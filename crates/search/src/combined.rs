//! Combined search + answer call with snippet fallback.
//!
//! The orchestrator calls [`search_and_answer`] once per backend. A failed
//! search fails the backend; a failed or empty answer degrades to an answer
//! synthesized from the top search results instead.

use crate::client::SearchBackend;
use crate::types::{AnswerResult, AnswerSource, BackendAnswer, Citation, SearchResult, SessionHint};
use concierge_core::{AppError, AppResult};
use unicode_segmentation::UnicodeSegmentation;

/// Maximum number of results used to synthesize a fallback answer.
pub const MAX_FALLBACK_SNIPPETS: usize = 3;

/// Maximum number of results turned into citations when the answer has none.
pub const MAX_DERIVED_CITATIONS: usize = 5;

/// Maximum graphemes kept from one snippet in a synthesized answer.
const MAX_SNIPPET_GRAPHEMES: usize = 500;

/// Lead-in line of a synthesized answer.
const FALLBACK_LEAD: &str = "검색 결과를 바탕으로 한 답변입니다:";

/// Run the search step, then the answer step, falling back to snippets.
pub async fn search_and_answer(
    backend: &dyn SearchBackend,
    query: &str,
    hint: &SessionHint,
) -> AppResult<BackendAnswer> {
    let backend_id = backend.backend_id().to_string();

    let page = backend.search(query, hint).await?;
    tracing::debug!(
        "Backend '{}' returned {} search result(s)",
        backend_id,
        page.results.len()
    );

    let answer_hint = page.hint.clone().or(hint);

    let (mut answer, source) = match backend.answer(query, &answer_hint).await {
        Ok(answer) if answer.is_usable() => (answer, AnswerSource::Generated),
        Ok(_) => {
            tracing::warn!(
                "Backend '{}' returned an empty answer, synthesizing from snippets",
                backend_id
            );
            (fallback_answer(&page.results, &answer_hint)?, AnswerSource::Snippets)
        }
        Err(AppError::AuthUnavailable(msg)) => return Err(AppError::AuthUnavailable(msg)),
        Err(e) => {
            tracing::warn!(
                "Answer step failed for backend '{}', synthesizing from snippets: {}",
                backend_id,
                e
            );
            (fallback_answer(&page.results, &answer_hint)?, AnswerSource::Snippets)
        }
    };

    if answer.citations.is_empty() {
        answer.citations = citations_from_results(&page.results);
    }

    let next_hint = SessionHint::new(answer.session.clone(), answer.query_id.clone()).or(&answer_hint);

    Ok(BackendAnswer {
        backend_id,
        results: page.results,
        answer,
        source,
        hint: next_hint,
    })
}

/// Build a fallback answer from search results, or fail when there is nothing to use.
fn fallback_answer(results: &[SearchResult], hint: &SessionHint) -> AppResult<AnswerResult> {
    let text = synthesize_answer(results).ok_or_else(|| {
        let backend = results
            .first()
            .map(|r| r.backend_id.clone())
            .unwrap_or_default();
        AppError::backend(backend, "no usable answer and no search results to fall back on")
    })?;

    Ok(AnswerResult {
        text,
        citations: Vec::new(),
        related_questions: Vec::new(),
        query_id: hint.query_id.clone(),
        session: hint.session.clone(),
    })
}

/// Concatenate up to three snippets with attribution.
///
/// Results without a snippet contribute their title. Returns `None` when no
/// result has any text to offer.
pub fn synthesize_answer(results: &[SearchResult]) -> Option<String> {
    let parts: Vec<String> = results
        .iter()
        .filter_map(|r| {
            let body = if r.snippet.trim().is_empty() {
                r.title.trim()
            } else {
                r.snippet.trim()
            };
            if body.is_empty() {
                return None;
            }
            Some((truncate_graphemes(body, MAX_SNIPPET_GRAPHEMES), r))
        })
        .take(MAX_FALLBACK_SNIPPETS)
        .enumerate()
        .map(|(i, (body, r))| {
            let source = if r.title.trim().is_empty() {
                r.backend_id.clone()
            } else {
                format!("{}, {}", r.title.trim(), r.backend_id)
            };
            format!("{}. {} (출처: {})", i + 1, body, source)
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(format!("{}\n\n{}", FALLBACK_LEAD, parts.join("\n\n")))
    }
}

/// Derive citations from the top results that carry a URI.
pub fn citations_from_results(results: &[SearchResult]) -> Vec<Citation> {
    results
        .iter()
        .filter(|r| !r.uri.trim().is_empty())
        .take(MAX_DERIVED_CITATIONS)
        .map(|r| Citation {
            title: r.title.clone(),
            uri: r.uri.clone(),
            snippet: if r.snippet.is_empty() {
                None
            } else {
                Some(truncate_graphemes(&r.snippet, 200))
            },
        })
        .collect()
}

/// Truncate to at most `max` grapheme clusters, appending "..." when cut.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockBackend;

    fn result(backend: &str, title: &str, uri: &str, snippet: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            uri: uri.to_string(),
            snippet: snippet.to_string(),
            backend_id: backend.to_string(),
            relevance_score: None,
            rank: 0,
        }
    }

    #[tokio::test]
    async fn test_generated_answer_used_when_usable() {
        let backend = MockBackend::new("faq")
            .with_result("요금 안내", "https://example.com/pricing", "기본 요금제는...", Some(0.9))
            .with_answer("기본 요금제는 월 단위로 청구됩니다.");

        let outcome = search_and_answer(&backend, "요금제 알려줘", &SessionHint::default())
            .await
            .unwrap();

        assert_eq!(outcome.source, AnswerSource::Generated);
        assert_eq!(outcome.answer.text, "기본 요금제는 월 단위로 청구됩니다.");
        // No citations from the answer step, so they are derived from results.
        assert_eq!(outcome.answer.citations.len(), 1);
        assert_eq!(outcome.answer.citations[0].uri, "https://example.com/pricing");
    }

    #[tokio::test]
    async fn test_empty_answer_falls_back_to_snippets() {
        let backend = MockBackend::new("faq")
            .with_result("A", "https://example.com/a", "first snippet", None)
            .with_result("B", "https://example.com/b", "second snippet", None)
            .with_answer("   ");

        let outcome = search_and_answer(&backend, "q", &SessionHint::default())
            .await
            .unwrap();

        assert_eq!(outcome.source, AnswerSource::Snippets);
        assert!(outcome.answer.text.starts_with(FALLBACK_LEAD));
        assert!(outcome.answer.text.contains("1. first snippet (출처: A, faq)"));
        assert!(outcome.answer.text.contains("2. second snippet (출처: B, faq)"));
    }

    #[tokio::test]
    async fn test_answer_error_falls_back_to_snippets() {
        let backend = MockBackend::new("faq")
            .with_result("A", "https://example.com/a", "only snippet", None)
            .failing_answer("HTTP 503");

        let outcome = search_and_answer(&backend, "q", &SessionHint::default())
            .await
            .unwrap();

        assert_eq!(outcome.source, AnswerSource::Snippets);
        assert!(outcome.answer.text.contains("only snippet"));
    }

    #[tokio::test]
    async fn test_search_failure_fails_backend() {
        let backend = MockBackend::new("faq").failing_search("HTTP 500");
        let err = search_and_answer(&backend, "q", &SessionHint::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_no_answer_and_no_results_is_error() {
        let backend = MockBackend::new("faq").failing_answer("HTTP 503");
        let err = search_and_answer(&backend, "q", &SessionHint::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no usable answer"));
    }

    #[tokio::test]
    async fn test_auth_failure_in_answer_step_propagates() {
        let backend = MockBackend::new("faq")
            .with_result("A", "https://example.com/a", "snippet", None)
            .auth_failure_on_answer();
        let err = search_and_answer(&backend, "q", &SessionHint::default())
            .await
            .unwrap_err();
        assert!(err.is_auth_unavailable());
    }

    #[test]
    fn test_synthesize_caps_at_three_and_uses_titles() {
        let results = vec![
            result("kb", "T1", "", "s1"),
            result("kb", "T2", "", ""),
            result("kb", "", "", ""),
            result("kb", "T4", "", "s4"),
            result("kb", "T5", "", "s5"),
        ];

        let text = synthesize_answer(&results).unwrap();
        assert!(text.contains("1. s1"));
        assert!(text.contains("2. T2"));
        assert!(text.contains("3. s4"));
        assert!(!text.contains("s5"));
    }

    #[test]
    fn test_synthesize_nothing() {
        assert!(synthesize_answer(&[]).is_none());
        assert!(synthesize_answer(&[result("kb", " ", "", "")]).is_none());
    }

    #[test]
    fn test_truncate_graphemes_keeps_hangul_intact() {
        let text = "가나다라마바사";
        assert_eq!(truncate_graphemes(text, 3), "가나다...");
        assert_eq!(truncate_graphemes(text, 7), text);
    }
}
