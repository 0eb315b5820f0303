//! Search backend abstraction.
//!
//! This module defines the trait every search/answer backend implements.

use crate::types::{AnswerResult, SearchPage, SessionHint};
use concierge_core::AppResult;

/// Trait for search/answer backends.
///
/// A backend is called in two logical steps: `search` retrieves candidate
/// documents, `answer` asks for generated text with citations. Both accept
/// the opaque identifiers a previous call returned so the backend can keep
/// its own conversation context.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Configured backend id (e.g., "faq").
    fn backend_id(&self) -> &str;

    /// Implementation name (e.g., "discovery", "mock").
    fn kind(&self) -> &str;

    /// Retrieve candidate documents.
    async fn search(&self, query: &str, hint: &SessionHint) -> AppResult<SearchPage>;

    /// Request a generated answer.
    ///
    /// An empty answer text is not an error at this level; the combined call
    /// decides whether the result is usable.
    async fn answer(&self, query: &str, hint: &SessionHint) -> AppResult<AnswerResult>;
}
