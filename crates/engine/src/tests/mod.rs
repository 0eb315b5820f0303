//! Cross-module tests: fan-out timing and the full request cycle.


use crate::classifier::SensitiveQueryClassifier;
use crate::orchestrator::{AggregateOptions, BackendHandle, QueryOrchestrator};
use crate::service::ConciergeService;
use async_trait::async_trait;
use concierge_core::{AppError, AppResult, BackendConfig};
use concierge_notify::{HandoffNotifier, HandoffRecord};
use concierge_search::MockBackend;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Notifier that forwards every record to a channel.
pub(crate) struct RecordingNotifier {
    sender: mpsc::UnboundedSender<HandoffRecord>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<HandoffRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

#[async_trait]
impl HandoffNotifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, record: &HandoffRecord) -> AppResult<()> {
        self.sender
            .send(record.clone())
            .map_err(|e| AppError::Notify(e.to_string()))
    }
}

pub(crate) fn handle(config: BackendConfig, mock: MockBackend) -> BackendHandle {
    BackendHandle::new(config, Arc::new(mock))
}

/// Service over the given backends with the built-in rules at 0.5.
pub(crate) fn service_with(
    backends: Vec<BackendHandle>,
    notifier: Arc<dyn HandoffNotifier>,
) -> ConciergeService {
    ConciergeService::new(
        QueryOrchestrator::new(backends, AggregateOptions::default()),
        SensitiveQueryClassifier::with_default_rules(0.5).unwrap(),
        notifier,
    )
}
