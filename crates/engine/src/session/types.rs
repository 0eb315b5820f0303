//! Conversation session types.

use crate::classifier::ClassificationResult;
use crate::orchestrator::AggregatedResponse;
use chrono::{DateTime, Utc};
use concierge_notify::TurnSummary;
use concierge_search::SessionHint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Lifecycle of a conversation.
///
/// `New` until the first turn is recorded, `Active` afterwards, and
/// `Escalated` once a human handoff has been requested. Only an explicit
/// [`ConversationSession::clear_handoff`] leaves `Escalated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    New,
    Active,
    Escalated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::New => "NEW",
            SessionState::Active => "ACTIVE",
            SessionState::Escalated => "ESCALATED",
        };
        f.write_str(name)
    }
}

/// One query and everything produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Position in the session, starting at 1
    pub seq: u64,
    pub query: String,
    pub response: AggregatedResponse,
    pub classification: ClassificationResult,
    pub timestamp: DateTime<Utc>,
}

/// In-memory state of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    id: String,
    turns: VecDeque<Turn>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    state: SessionState,
    handoff_requested: bool,

    /// Latest backend session identifiers, by backend id
    backend_sessions: HashMap<String, SessionHint>,

    next_seq: u64,
    max_turns: usize,
}

impl ConversationSession {
    pub fn new(id: impl Into<String>, max_turns: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: VecDeque::new(),
            created_at: now,
            last_activity: now,
            state: SessionState::New,
            handoff_requested: false,
            backend_sessions: HashMap::new(),
            next_seq: 1,
            max_turns: max_turns.max(1),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handoff_requested(&self) -> bool {
        self.handoff_requested
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Retained turns, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Turns recorded over the whole session, including trimmed ones.
    pub fn total_turns(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.back()
    }

    /// Request a human handoff.
    ///
    /// Returns `true` only on the transition into `Escalated`.
    pub fn escalate(&mut self) -> bool {
        if self.handoff_requested {
            return false;
        }
        self.handoff_requested = true;
        self.state = SessionState::Escalated;
        true
    }

    /// Reset the handoff flag. Administrative only.
    pub fn clear_handoff(&mut self) {
        self.handoff_requested = false;
        self.state = if self.next_seq > 1 {
            SessionState::Active
        } else {
            SessionState::New
        };
    }

    /// Record a turn and advance the state machine.
    ///
    /// A classification at or above `threshold` escalates the session. The
    /// stored response always carries `consultant_needed` when the session is
    /// escalated.
    pub fn append_turn(
        &mut self,
        query: impl Into<String>,
        mut response: AggregatedResponse,
        classification: ClassificationResult,
        threshold: f32,
    ) -> &Turn {
        if classification.exceeds(threshold) {
            self.escalate();
        } else if self.state == SessionState::New {
            self.state = SessionState::Active;
        }
        response.consultant_needed |= self.handoff_requested;

        for (backend_id, report) in &response.backends {
            if let Some(hint) = report.hint.as_ref().filter(|_| report.is_success()) {
                if !hint.is_empty() {
                    self.backend_sessions.insert(backend_id.clone(), hint.clone());
                }
            }
        }

        let now = Utc::now();
        let turn = Turn {
            seq: self.next_seq,
            query: query.into(),
            response,
            classification,
            timestamp: now,
        };
        self.next_seq += 1;
        self.last_activity = now;

        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }

        &self.turns[self.turns.len() - 1]
    }

    /// Backend session identifiers to send with the next fan-out.
    pub fn backend_hints(&self) -> HashMap<String, SessionHint> {
        self.backend_sessions.clone()
    }

    /// The last `count` turns as query/answer pairs, oldest first.
    pub fn recent_turns(&self, count: usize) -> Vec<TurnSummary> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns
            .iter()
            .skip(skip)
            .map(|turn| TurnSummary::new(turn.query.clone(), turn.response.answer.clone()))
            .collect()
    }
}
