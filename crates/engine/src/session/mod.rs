//! Conversation sessions.
//!
//! The store maps session ids to individually locked sessions. A caller holds
//! a session's lock for its whole request cycle, so requests on one session
//! run one at a time while different sessions proceed in parallel.

pub mod log;
pub mod types;

pub use log::{
    create_conversation_log, ConversationLog, NoopConversationLog, SqliteConversationLog,
};
pub use types::{ConversationSession, SessionState, Turn};

use crate::classifier::ClassificationResult;
use crate::orchestrator::AggregatedResponse;
use concierge_core::config::SessionConfig;
use concierge_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Generate a session id of the form `session_<16 hex>_<unix seconds>`.
pub fn generate_session_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", &random[..16], chrono::Utc::now().timestamp())
}

/// In-memory session registry.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<ConversationSession>>>>,
    max_turns: usize,
    threshold: f32,
}

impl SessionStore {
    /// `threshold` is the classification confidence that escalates a session.
    pub fn new(config: &SessionConfig, threshold: f32) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns: config.max_turns,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Lock a session for a request cycle, creating it when unknown.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<ConversationSession> {
        let existing = self.sessions.read().await.get(session_id).cloned();
        let session = match existing {
            Some(session) => session,
            None => {
                let mut sessions = self.sessions.write().await;
                Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
                    tracing::debug!(session_id, "Created session");
                    Arc::new(Mutex::new(ConversationSession::new(
                        session_id,
                        self.max_turns,
                    )))
                }))
            }
        };
        session.lock_owned().await
    }

    /// Record a turn, creating the session when unknown.
    ///
    /// Returns a snapshot of the session after the append.
    pub async fn append_turn(
        &self,
        session_id: &str,
        query: &str,
        response: AggregatedResponse,
        classification: ClassificationResult,
    ) -> ConversationSession {
        let mut session = self.lock(session_id).await;
        session.append_turn(query, response, classification, self.threshold);
        session.clone()
    }

    /// Snapshot of a session, if it exists.
    pub async fn get(&self, session_id: &str) -> Option<ConversationSession> {
        let session = self.sessions.read().await.get(session_id).cloned()?;
        let guard = session.lock().await;
        Some(guard.clone())
    }

    /// Reset the handoff flag of an existing session.
    pub async fn clear_handoff(&self, session_id: &str) -> AppResult<()> {
        let session = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::Other(format!("Unknown session: {}", session_id)))?;
        session.lock().await.clear_handoff();
        tracing::info!(session_id, "Handoff flag cleared");
        Ok(())
    }

    /// Callers holding or queued on a session's lock.
    #[cfg(test)]
    pub(crate) async fn lock_holders(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map_or(0, |session| Arc::strong_count(session) - 1)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
