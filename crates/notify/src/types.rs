//! Handoff record types.
//!
//! A handoff record is what a human agent receives when a conversation needs
//! to be picked up by a person.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Topic the assistant must leave to a human agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveCategory {
    Price,
    Discount,
    Consultant,
    Contract,
    Privacy,
}

impl SensitiveCategory {
    pub const ALL: [SensitiveCategory; 5] = [
        SensitiveCategory::Price,
        SensitiveCategory::Discount,
        SensitiveCategory::Consultant,
        SensitiveCategory::Contract,
        SensitiveCategory::Privacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensitiveCategory::Price => "price",
            SensitiveCategory::Discount => "discount",
            SensitiveCategory::Consultant => "consultant",
            SensitiveCategory::Contract => "contract",
            SensitiveCategory::Privacy => "privacy",
        }
    }
}

impl fmt::Display for SensitiveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One earlier query/answer pair of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub query: String,
    pub answer: String,
}

impl TurnSummary {
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
        }
    }
}

/// Speaker of a client-supplied history message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    #[serde(alias = "model", alias = "assistant")]
    Assistant,
}

/// A chat message the client sent along with its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub text: String,
}

impl HistoryMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
        }
    }
}

/// Everything a human agent needs to take over a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub session_id: String,

    /// Query that triggered the handoff
    pub query: String,

    /// Sensitive categories detected in the query
    pub categories: Vec<SensitiveCategory>,

    pub confidence: f32,

    pub timestamp: DateTime<Utc>,

    /// Most recent turns, oldest first
    pub recent_turns: Vec<TurnSummary>,

    /// Client-supplied history, when the client sent one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryMessage>,
}

impl HandoffRecord {
    pub fn new(
        session_id: impl Into<String>,
        query: impl Into<String>,
        categories: Vec<SensitiveCategory>,
        confidence: f32,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            categories,
            confidence,
            timestamp: Utc::now(),
            recent_turns: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_recent_turns(mut self, turns: Vec<TurnSummary>) -> Self {
        self.recent_turns = turns;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    /// Category names joined for display, e.g. `price, discount`.
    pub fn category_list(&self) -> String {
        self.categories
            .iter()
            .map(SensitiveCategory::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Conversation lines shown to the agent.
    ///
    /// Client history wins when present; otherwise the recorded turns are
    /// expanded into user/assistant messages.
    pub fn conversation(&self) -> Vec<HistoryMessage> {
        if !self.history.is_empty() {
            return self.history.clone();
        }

        self.recent_turns
            .iter()
            .flat_map(|turn| {
                [
                    HistoryMessage::user(turn.query.clone()),
                    HistoryMessage::assistant(turn.answer.clone()),
                ]
            })
            .collect()
    }
}
