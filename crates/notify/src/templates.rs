//! Message templates for handoff notifications and user-facing replies.

use crate::types::{HandoffRecord, MessageRole, SensitiveCategory};
use concierge_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use unicode_segmentation::UnicodeSegmentation;

const DEFAULT_NOTIFICATION: &str = "🔔 *새로운 상담 요청*

*최근 질문:* {{query}}
{{#if categories}}*민감한 카테고리:* {{categories}} (신뢰도 {{confidence}})
{{/if}}{{#if conversation}}
*대화 내역:*
{{#each conversation}}
{{this.speaker}}: {{this.text}}
{{/each}}{{/if}}";

const DEFAULT_REPLY: &str = "해당 질문은 제가 처리할 수 없습니다. 상담사와 연결을 도와드릴까요?";

/// Templates used to talk to agents and to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplates {
    /// Handlebars template for the agent notification text
    #[serde(default = "default_notification")]
    pub notification: String,

    /// Reply shown to the user per category
    #[serde(default = "default_replies")]
    pub replies: BTreeMap<SensitiveCategory, String>,

    /// Order in which categories pick the reply
    #[serde(default = "default_reply_order")]
    pub reply_order: Vec<SensitiveCategory>,

    /// Reply used when no category has its own text
    #[serde(default = "default_reply")]
    pub default_reply: String,

    #[serde(default = "default_user_label")]
    pub user_label: String,

    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,
}

fn default_notification() -> String {
    DEFAULT_NOTIFICATION.to_string()
}

fn default_replies() -> BTreeMap<SensitiveCategory, String> {
    [
        (SensitiveCategory::Consultant, DEFAULT_REPLY),
        (
            SensitiveCategory::Price,
            "구체적인 가격 정보는 제가 정확하게 안내드리기 어렵습니다. 정확한 요금 안내를 위해 상담사와 연결을 도와드릴까요?",
        ),
        (
            SensitiveCategory::Discount,
            "할인이나 프로모션에 관한 문의는 제가 정확한 정보를 제공하기 어렵습니다. 상담사와 연결을 도와드릴까요?",
        ),
        (
            SensitiveCategory::Contract,
            "계약이나 법적 사항에 대한 문의는 제가 처리할 수 없습니다. 상담사와 연결을 도와드릴까요?",
        ),
        (
            SensitiveCategory::Privacy,
            "개인정보나 보안 관련 문의는 제가 처리할 수 없습니다. 상담사와 연결을 도와드릴까요?",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k, v.to_string()))
    .collect()
}

fn default_reply_order() -> Vec<SensitiveCategory> {
    vec![
        SensitiveCategory::Consultant,
        SensitiveCategory::Price,
        SensitiveCategory::Discount,
        SensitiveCategory::Contract,
        SensitiveCategory::Privacy,
    ]
}

fn default_reply() -> String {
    DEFAULT_REPLY.to_string()
}

fn default_user_label() -> String {
    "👤 사용자".to_string()
}

fn default_assistant_label() -> String {
    "🤖 AI".to_string()
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            notification: default_notification(),
            replies: default_replies(),
            reply_order: default_reply_order(),
            default_reply: default_reply(),
            user_label: default_user_label(),
            assistant_label: default_assistant_label(),
        }
    }
}

impl MessageTemplates {
    /// Reply shown to the user when a handoff is offered.
    ///
    /// The first category in `reply_order` that was detected picks the text;
    /// other detected categories follow in the order they were given.
    pub fn handoff_reply(&self, categories: &[SensitiveCategory]) -> String {
        self.reply_order
            .iter()
            .filter(|c| categories.contains(c))
            .chain(categories.iter())
            .find_map(|c| self.replies.get(c))
            .cloned()
            .unwrap_or_else(|| self.default_reply.clone())
    }

    /// Render the agent notification text for a record.
    pub fn render_notification(
        &self,
        record: &HandoffRecord,
        max_text_length: usize,
    ) -> AppResult<String> {
        let conversation: Vec<_> = record
            .conversation()
            .into_iter()
            .map(|msg| {
                let speaker = match msg.role {
                    MessageRole::User => &self.user_label,
                    MessageRole::Assistant => &self.assistant_label,
                };
                json!({
                    "speaker": speaker,
                    "text": truncate_text(&msg.text, max_text_length),
                })
            })
            .collect();

        let context = json!({
            "sessionId": record.session_id,
            "query": truncate_text(&record.query, max_text_length),
            "categories": record.category_list(),
            "confidence": format!("{:.2}", record.confidence),
            "timestamp": record.timestamp.to_rfc3339(),
            "conversation": conversation,
        });

        render_template(&self.notification, &context)
    }
}

/// Render a Handlebars template with a JSON context.
fn render_template(template: &str, context: &serde_json::Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Chat messages are plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("notification", template)
        .map_err(|e| AppError::Template(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("notification", context)
        .map_err(|e| AppError::Template(format!("Failed to render template: {}", e)))
}

/// Cut text to `max` graphemes, marking the cut with "...".
pub fn truncate_text(text: &str, max: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        head + "..."
    } else {
        head
    }
}
