//! Handoff notifiers.
//!
//! Notification is fire-and-forget: [`dispatch`] spawns delivery on the
//! runtime and the request that triggered it never waits for the outcome.

use crate::templates::MessageTemplates;
use crate::types::HandoffRecord;
use concierge_core::config::{NotifierConfig, NotifierKind};
use concierge_core::{AppConfig, AppError, AppResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Destination for handoff records.
#[async_trait::async_trait]
pub trait HandoffNotifier: Send + Sync {
    /// Channel name (e.g., "log", "webhook")
    fn name(&self) -> &str;

    /// Deliver one handoff record.
    async fn notify(&self, record: &HandoffRecord) -> AppResult<()>;
}

/// Spawn delivery of a record. Failures are logged at warn and dropped.
pub fn dispatch(notifier: Arc<dyn HandoffNotifier>, record: HandoffRecord) -> JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.notify(&record).await {
            Ok(()) => tracing::info!(
                session_id = %record.session_id,
                "Handoff notification sent via {}",
                notifier.name()
            ),
            Err(e) => tracing::warn!(
                session_id = %record.session_id,
                "Handoff notification via {} failed: {}",
                notifier.name(),
                e
            ),
        }
    })
}

/// Notifier that renders the message into the log.
pub struct LogNotifier {
    templates: MessageTemplates,
    max_text_length: usize,
}

impl LogNotifier {
    pub fn new(templates: MessageTemplates, max_text_length: usize) -> Self {
        Self {
            templates,
            max_text_length,
        }
    }
}

#[async_trait::async_trait]
impl HandoffNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, record: &HandoffRecord) -> AppResult<()> {
        let text = self
            .templates
            .render_notification(record, self.max_text_length)?;
        tracing::info!(
            session_id = %record.session_id,
            categories = %record.category_list(),
            "Handoff requested\n{}",
            text
        );
        Ok(())
    }
}

/// Notifier that posts a Google Chat message to a webhook.
pub struct WebhookNotifier {
    url: String,
    templates: MessageTemplates,
    max_text_length: usize,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        templates: MessageTemplates,
        max_text_length: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            templates,
            max_text_length,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Build the chat payload: rendered text plus a key/value card.
    pub fn build_payload(&self, record: &HandoffRecord) -> AppResult<Value> {
        let text = self
            .templates
            .render_notification(record, self.max_text_length)?;

        let widget = |label: &str, content: String| {
            json!({ "keyValue": { "topLabel": label, "content": content } })
        };

        Ok(json!({
            "text": text,
            "cards": [{
                "sections": [{
                    "widgets": [
                        widget("요청 시간", record.timestamp.to_rfc3339()),
                        widget("세션 ID", record.session_id.clone()),
                        widget("민감한 카테고리", record.category_list()),
                    ]
                }]
            }]
        }))
    }
}

#[async_trait::async_trait]
impl HandoffNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, record: &HandoffRecord) -> AppResult<()> {
        let payload = self.build_payload(record)?;

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Notify(format!("Failed to reach webhook: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Notify(format!(
                "Webhook returned status {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Create the notifier named in the configuration.
///
/// A webhook notifier whose URL variable is unset degrades to the log
/// notifier with a warning.
pub fn create_notifier(
    config: &AppConfig,
    templates: MessageTemplates,
) -> Arc<dyn HandoffNotifier> {
    let settings: &NotifierConfig = &config.notifier;
    match settings.kind {
        NotifierKind::Log => Arc::new(LogNotifier::new(templates, settings.max_text_length)),
        NotifierKind::Webhook => match std::env::var(&settings.webhook_url_env) {
            Ok(url) if !url.trim().is_empty() => Arc::new(WebhookNotifier::new(
                url.trim(),
                templates,
                settings.max_text_length,
                Duration::from_millis(settings.timeout_ms),
            )),
            _ => {
                tracing::warn!(
                    "{} is not set; handoff notifications will only be logged",
                    settings.webhook_url_env
                );
                Arc::new(LogNotifier::new(templates, settings.max_text_length))
            }
        },
    }
}
