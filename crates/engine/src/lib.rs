//! Request-cycle engine for Concierge.
//!
//! This crate ties the search backends and the notifier together:
//! - Sensitive-query classification over a weighted rule table
//! - Concurrent backend fan-out with a shared deadline and deterministic merge
//! - Conversation sessions with a per-session lock and an append-only log
//! - The service that runs one chat request end to end

pub mod classifier;
pub mod orchestrator;
pub mod service;
pub mod session;

#[cfg(test)]
mod tests;

// Re-export main types
pub use classifier::{
    ClassificationResult, RuleTable, SensitiveCategory, SensitiveQueryClassifier,
};
pub use orchestrator::{
    aggregate, AggregateOptions, AggregatedResponse, BackendHandle, BackendReport, BackendStatus,
    QueryOrchestrator,
};
pub use service::{ChatRequest, ChatResponse, ConciergeService};
pub use session::{
    create_conversation_log, generate_session_id, ConversationLog, ConversationSession,
    NoopConversationLog, SessionState, SessionStore, SqliteConversationLog, Turn,
};
