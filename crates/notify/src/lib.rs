//! Handoff notification for Concierge.
//!
//! This crate turns a sensitive conversation into a message for human agents:
//! - Handoff record types
//! - Handlebars message templates with YAML overrides
//! - Log and chat-webhook notifiers with fire-and-forget dispatch

pub mod loader;
pub mod notifier;
pub mod templates;
pub mod types;

// Re-export main types
pub use loader::load_templates;
pub use notifier::{create_notifier, dispatch, HandoffNotifier, LogNotifier, WebhookNotifier};
pub use templates::{truncate_text, MessageTemplates};
pub use types::{HandoffRecord, HistoryMessage, MessageRole, SensitiveCategory, TurnSummary};
