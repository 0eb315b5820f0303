//! Discovery Engine backend.
//!
//! Talks to the Vertex AI Search (Discovery Engine) REST API. Each backend
//! is one engine; `:search` retrieves documents and opens a backend session,
//! `:answer` generates an answer in that session.

use crate::auth::CredentialCache;
use crate::client::SearchBackend;
use crate::types::{AnswerResult, Citation, SearchPage, SearchResult, SessionHint};
use concierge_core::config::DiscoveryConfig;
use concierge_core::{AppError, AppResult, BackendConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Longest error body kept in a backend error message.
const MAX_ERROR_BODY: usize = 300;

/// Discovery Engine search/answer client for one engine.
pub struct DiscoveryBackend {
    config: BackendConfig,
    project_id: String,
    settings: DiscoveryConfig,
    preamble: Option<String>,
    credentials: CredentialCache,
    client: reqwest::Client,
}

impl DiscoveryBackend {
    pub fn new(
        config: BackendConfig,
        project_id: impl Into<String>,
        settings: DiscoveryConfig,
        credentials: CredentialCache,
    ) -> Self {
        Self {
            config,
            project_id: project_id.into(),
            settings,
            preamble: None,
            credentials,
            client: reqwest::Client::new(),
        }
    }

    /// Set the answer-generation preamble.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        if !preamble.trim().is_empty() {
            self.preamble = Some(preamble);
        }
        self
    }

    /// `projects/{p}/locations/{l}/collections/{c}/engines/{e}`
    fn engine_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/collections/{}/engines/{}",
            self.project_id, self.config.location, self.config.collection_id, self.config.engine_id
        )
    }

    fn serving_config_url(&self, method: &str) -> String {
        format!(
            "{}/{}/servingConfigs/{}:{}",
            self.settings.base_url.trim_end_matches('/'),
            self.engine_path(),
            self.config.serving_config_id,
            method
        )
    }

    /// Session name sent on the search step; `-` asks for a new session.
    fn session_name(&self, hint: &SessionHint) -> String {
        hint.session
            .clone()
            .unwrap_or_else(|| format!("{}/sessions/-", self.engine_path()))
    }

    fn search_payload(&self, query: &str, hint: &SessionHint) -> Value {
        json!({
            "query": query,
            "pageSize": self.config.max_results,
            "session": self.session_name(hint),
            "spellCorrectionSpec": { "mode": "AUTO" },
            "languageCode": self.settings.language_code,
            "userInfo": { "timeZone": self.settings.time_zone },
            "contentSearchSpec": { "snippetSpec": { "returnSnippet": true } }
        })
    }

    fn answer_payload(&self, query: &str, hint: &SessionHint) -> Value {
        let mut query_spec = json!({ "text": query });
        if let Some(query_id) = &hint.query_id {
            query_spec["queryId"] = json!(query_id);
        }

        let mut generation = json!({
            "ignoreAdversarialQuery": false,
            "ignoreNonAnswerSeekingQuery": false,
            "ignoreLowRelevantContent": false,
            "includeCitations": true,
            "modelSpec": { "modelVersion": self.settings.model_version }
        });
        if let Some(preamble) = &self.preamble {
            generation["promptSpec"] = json!({ "preamble": preamble });
        }

        let mut payload = json!({
            "query": query_spec,
            "relatedQuestionsSpec": { "enable": true },
            "answerGenerationSpec": generation
        });
        if let Some(session) = &hint.session {
            payload["session"] = json!(session);
        }
        payload
    }

    /// POST a JSON body with a bearer token, retrying once on connect errors.
    async fn post_json(&self, url: &str, body: &Value) -> AppResult<Value> {
        let credential = self.credentials.get_credential().await?;

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let sent = self
                .client
                .post(url)
                .header(reqwest::header::AUTHORIZATION, credential.bearer())
                .json(body)
                .timeout(self.config.timeout())
                .send()
                .await;

            match sent {
                Ok(response) => break response,
                Err(e) if e.is_connect() && attempt == 1 => {
                    tracing::debug!(
                        "Connection to backend '{}' failed, retrying once: {}",
                        self.config.id,
                        e
                    );
                }
                Err(e) if e.is_timeout() => {
                    return Err(AppError::BackendTimeout {
                        backend: self.config.id.clone(),
                    });
                }
                Err(e) => {
                    return Err(AppError::backend(
                        &self.config.id,
                        format!("request failed: {}", e),
                    ));
                }
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.credentials.invalidate().await;
            return Err(AppError::backend(
                &self.config.id,
                "HTTP 401 Unauthorized (credential invalidated)",
            ));
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(AppError::backend(
                &self.config.id,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        response.json().await.map_err(|e| {
            AppError::backend(&self.config.id, format!("invalid JSON response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl SearchBackend for DiscoveryBackend {
    fn backend_id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> &str {
        "discovery"
    }

    async fn search(&self, query: &str, hint: &SessionHint) -> AppResult<SearchPage> {
        tracing::debug!("Discovery search on '{}'", self.config.id);
        let body = self.search_payload(query, hint);
        let value = self.post_json(&self.serving_config_url("search"), &body).await?;
        parse_search_response(&self.config.id, value)
    }

    async fn answer(&self, query: &str, hint: &SessionHint) -> AppResult<AnswerResult> {
        tracing::debug!("Discovery answer on '{}'", self.config.id);
        let body = self.answer_payload(query, hint);
        let value = self.post_json(&self.serving_config_url("answer"), &body).await?;
        let mut answer = parse_answer_response(&self.config.id, value)?;

        if answer.query_id.is_none() {
            answer.query_id = hint.query_id.clone();
        }
        if answer.session.is_none() {
            answer.session = hint.session.clone();
        }
        Ok(answer)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSearchResponse {
    #[serde(default)]
    results: Vec<WireResult>,
    #[serde(default)]
    session_info: Option<WireSessionInfo>,
    #[serde(default)]
    total_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSessionInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    query_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    #[serde(default)]
    document: WireDocument,
    #[serde(default)]
    model_scores: HashMap<String, WireDoubleList>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDoubleList {
    #[serde(default)]
    values: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocument {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    derived_struct_data: WireDerivedData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDerivedData {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippets: Vec<WireSnippet>,
    #[serde(default)]
    relevance_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct WireSnippet {
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnswerResponse {
    #[serde(default)]
    answer: WireAnswer,
    #[serde(default)]
    session: Option<WireSession>,
    #[serde(default)]
    related_questions: Vec<WireRelatedQuestion>,
}

#[derive(Debug, Default, Deserialize)]
struct WireSession {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnswer {
    #[serde(default)]
    answer_text: String,
    #[serde(default)]
    citations: Vec<WireCitation>,
    #[serde(default)]
    references: Vec<WireReference>,
    #[serde(default)]
    related_questions: Vec<WireRelatedQuestion>,
}

#[derive(Debug, Default, Deserialize)]
struct WireCitation {
    #[serde(default)]
    sources: Vec<WireCitationSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCitationSource {
    #[serde(default)]
    reference_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReference {
    #[serde(default)]
    chunk_info: Option<WireChunkInfo>,
    #[serde(default)]
    unstructured_document_info: Option<WireDocumentInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChunkInfo {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    document_metadata: Option<WireDocumentInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocumentInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    chunk_contents: Vec<WireChunkContent>,
}

#[derive(Debug, Default, Deserialize)]
struct WireChunkContent {
    #[serde(default)]
    content: String,
}

/// Related questions arrive either as plain strings or as `{question}` objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRelatedQuestion {
    Text(String),
    Object {
        #[serde(default)]
        question: String,
    },
}

impl WireRelatedQuestion {
    fn into_text(self) -> String {
        match self {
            WireRelatedQuestion::Text(text) => text,
            WireRelatedQuestion::Object { question } => question,
        }
    }
}

impl WireReference {
    fn into_citation(self) -> Option<Citation> {
        let (info, content) = match (self.unstructured_document_info, self.chunk_info) {
            (Some(info), _) => {
                let content = info.chunk_contents.first().map(|c| c.content.clone());
                (info, content)
            }
            (None, Some(chunk)) => (chunk.document_metadata.unwrap_or_default(), chunk.content),
            (None, None) => return None,
        };

        let uri = info.uri.unwrap_or_default();
        let title = info.title.unwrap_or_default();
        if uri.is_empty() && title.is_empty() {
            return None;
        }

        Some(Citation {
            title: strip_markup(&title),
            uri,
            snippet: content
                .map(|c| strip_markup(&c))
                .filter(|c| !c.is_empty()),
        })
    }
}

/// Parse a `:search` response body.
pub fn parse_search_response(backend_id: &str, value: Value) -> AppResult<SearchPage> {
    let wire: WireSearchResponse = serde_json::from_value(value).map_err(|e| {
        AppError::backend(backend_id, format!("malformed search response: {}", e))
    })?;

    let results = wire
        .results
        .into_iter()
        .enumerate()
        .map(|(rank, result)| {
            let data = result.document.derived_struct_data;
            let title = data
                .title
                .map(|t| strip_markup(&t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("문서 {}", rank + 1));
            let uri = data
                .link
                .filter(|l| !l.is_empty())
                .or(result.document.uri)
                .unwrap_or_default();
            let snippet = data
                .snippets
                .first()
                .map(|s| strip_markup(&s.snippet))
                .unwrap_or_default();
            let relevance_score = result
                .model_scores
                .get("relevance_score")
                .or_else(|| result.model_scores.values().next())
                .and_then(|scores| scores.values.first().copied())
                .or(data.relevance_score)
                .map(|score| score as f32);

            SearchResult {
                title,
                uri,
                snippet,
                backend_id: backend_id.to_string(),
                relevance_score,
                rank,
            }
        })
        .collect();

    let info = wire.session_info.unwrap_or_default();

    Ok(SearchPage {
        results,
        hint: SessionHint::new(info.name, info.query_id),
        total_size: wire.total_size,
    })
}

/// Parse an `:answer` response body.
///
/// Citations are resolved through their reference ids; when none resolve the
/// raw references are used instead.
pub fn parse_answer_response(backend_id: &str, value: Value) -> AppResult<AnswerResult> {
    let wire: WireAnswerResponse = serde_json::from_value(value).map_err(|e| {
        AppError::backend(backend_id, format!("malformed answer response: {}", e))
    })?;

    let WireAnswer {
        answer_text,
        citations,
        references,
        related_questions,
    } = wire.answer;

    let referenced: Vec<usize> = citations
        .iter()
        .flat_map(|c| c.sources.iter())
        .filter_map(|s| s.reference_id.as_deref())
        .filter_map(|id| id.parse::<usize>().ok())
        .collect();

    let mut references: Vec<Option<Citation>> =
        references.into_iter().map(WireReference::into_citation).collect();

    let mut resolved = Vec::new();
    for index in referenced {
        if let Some(citation) = references.get(index).and_then(|c| c.clone()) {
            resolved.push(citation);
        }
    }
    if resolved.is_empty() {
        resolved = references.drain(..).flatten().collect();
    }

    let mut seen = HashSet::new();
    let citations = resolved
        .into_iter()
        .filter(|c| c.uri.is_empty() || seen.insert(c.uri.clone()))
        .collect();

    let related_questions = related_questions
        .into_iter()
        .chain(wire.related_questions)
        .map(WireRelatedQuestion::into_text)
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    Ok(AnswerResult {
        text: answer_text.trim().to_string(),
        citations,
        related_questions,
        query_id: None,
        session: wire.session.and_then(|s| s.name),
    })
}

/// Remove highlight tags and decode the few entities snippets carry.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    out.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialCache, StaticTokenSource};
    use std::sync::Arc;
    use std::time::Duration;

    fn backend() -> DiscoveryBackend {
        let mut config = BackendConfig::new("faq");
        config.engine_id = "faq-engine".to_string();
        let source = Arc::new(StaticTokenSource::new(
            "CONCIERGE_TEST_UNUSED_TOKEN",
            Duration::from_secs(60),
        ));
        DiscoveryBackend::new(
            config,
            "demo-project",
            DiscoveryConfig::default(),
            CredentialCache::new(source, Duration::ZERO),
        )
    }

    #[test]
    fn test_serving_config_url() {
        let backend = backend();
        assert_eq!(
            backend.serving_config_url("search"),
            "https://discoveryengine.googleapis.com/v1alpha/projects/demo-project/locations/global/collections/default_collection/engines/faq-engine/servingConfigs/default_search:search"
        );
    }

    #[test]
    fn test_search_payload_opens_new_session_without_hint() {
        let backend = backend();
        let payload = backend.search_payload("요금제", &SessionHint::default());

        assert_eq!(payload["query"], "요금제");
        assert_eq!(payload["pageSize"], 5);
        assert_eq!(
            payload["session"],
            "projects/demo-project/locations/global/collections/default_collection/engines/faq-engine/sessions/-"
        );
        assert_eq!(payload["languageCode"], "ko");
        assert_eq!(payload["userInfo"]["timeZone"], "Asia/Seoul");
        assert_eq!(
            payload["contentSearchSpec"]["snippetSpec"]["returnSnippet"],
            true
        );
    }

    #[test]
    fn test_answer_payload_carries_hint_and_preamble() {
        let backend = backend().with_preamble("친절하게 답하세요.");
        let hint = SessionHint::new(Some("sessions/123".to_string()), Some("q-9".to_string()));
        let payload = backend.answer_payload("요금제", &hint);

        assert_eq!(payload["query"]["text"], "요금제");
        assert_eq!(payload["query"]["queryId"], "q-9");
        assert_eq!(payload["session"], "sessions/123");
        assert_eq!(payload["relatedQuestionsSpec"]["enable"], true);
        assert_eq!(
            payload["answerGenerationSpec"]["promptSpec"]["preamble"],
            "친절하게 답하세요."
        );
        assert_eq!(
            payload["answerGenerationSpec"]["modelSpec"]["modelVersion"],
            "gemini-2.5-flash/answer_gen/v1"
        );
    }

    #[test]
    fn test_answer_payload_without_preamble() {
        let payload = backend().answer_payload("q", &SessionHint::default());
        assert!(payload["answerGenerationSpec"].get("promptSpec").is_none());
        assert!(payload.get("session").is_none());
    }

    #[test]
    fn test_parse_search_response() {
        let value = json!({
            "results": [
                {
                    "id": "1",
                    "document": {
                        "derivedStructData": {
                            "title": "요금 <b>안내</b>",
                            "link": "gs://bucket/pricing.pdf",
                            "snippets": [{ "snippet": "기본&nbsp;<b>요금제</b>는 월 9,900원" }]
                        }
                    },
                    "modelScores": { "relevance_score": { "values": [0.82] } }
                },
                {
                    "id": "2",
                    "document": {
                        "uri": "https://example.com/faq",
                        "derivedStructData": {}
                    }
                }
            ],
            "totalSize": 2,
            "sessionInfo": { "name": "projects/p/sessions/42", "queryId": "projects/p/queries/7" }
        });

        let page = parse_search_response("faq", value).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].title, "요금 안내");
        assert_eq!(page.results[0].snippet, "기본 요금제는 월 9,900원");
        assert_eq!(page.results[0].relevance_score, Some(0.82));
        assert_eq!(page.results[0].rank, 0);
        assert_eq!(page.results[1].title, "문서 2");
        assert_eq!(page.results[1].uri, "https://example.com/faq");
        assert_eq!(page.results[1].relevance_score, None);
        assert_eq!(page.hint.session.as_deref(), Some("projects/p/sessions/42"));
        assert_eq!(page.hint.query_id.as_deref(), Some("projects/p/queries/7"));
        assert_eq!(page.total_size, Some(2));
    }

    #[test]
    fn test_parse_empty_search_response() {
        let page = parse_search_response("faq", json!({})).unwrap();
        assert!(page.results.is_empty());
        assert!(page.hint.is_empty());
    }

    #[test]
    fn test_parse_malformed_search_response() {
        let err = parse_search_response("faq", json!({ "results": "oops" })).unwrap_err();
        assert!(matches!(err, AppError::Backend { ref backend, .. } if backend == "faq"));
    }

    #[test]
    fn test_parse_answer_response_resolves_citations() {
        let value = json!({
            "answer": {
                "answerText": "  기본 요금제는 월 9,900원입니다. ",
                "citations": [
                    { "startIndex": "0", "endIndex": "10", "sources": [{ "referenceId": "1" }] },
                    { "sources": [{ "referenceId": "1" }, { "referenceId": "9" }] }
                ],
                "references": [
                    { "unstructuredDocumentInfo": { "title": "무관한 문서", "uri": "https://example.com/other" } },
                    {
                        "chunkInfo": {
                            "content": "월 9,900원",
                            "documentMetadata": { "title": "요금 안내", "uri": "https://example.com/pricing" }
                        }
                    }
                ],
                "relatedQuestions": ["할인 혜택이 있나요?", "  "]
            },
            "session": { "name": "projects/p/sessions/42" }
        });

        let answer = parse_answer_response("faq", value).unwrap();
        assert_eq!(answer.text, "기본 요금제는 월 9,900원입니다.");
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].uri, "https://example.com/pricing");
        assert_eq!(answer.citations[0].snippet.as_deref(), Some("월 9,900원"));
        assert_eq!(answer.related_questions, vec!["할인 혜택이 있나요?"]);
        assert_eq!(answer.session.as_deref(), Some("projects/p/sessions/42"));
    }

    #[test]
    fn test_parse_answer_response_related_question_objects() {
        let value = json!({
            "answer": { "answerText": "" },
            "relatedQuestions": [{ "question": "요금제 변경은 어떻게 하나요?" }]
        });

        let answer = parse_answer_response("faq", value).unwrap();
        assert!(!answer.is_usable());
        assert_eq!(answer.related_questions, vec!["요금제 변경은 어떻게 하나요?"]);
        assert!(answer.citations.is_empty());
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("<b>A</b> &amp; B"), "A & B");
        assert_eq!(strip_markup("  a \n b  "), "a b");
        assert_eq!(strip_markup("&quot;x&quot;"), "\"x\"");
    }
}
