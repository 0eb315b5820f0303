//! Ask command handler.
//!
//! Runs one query through the full request cycle: classification, backend
//! fan-out and session bookkeeping.

use clap::Args;
use concierge_core::{config::AppConfig, AppError, AppResult};
use concierge_engine::{ChatRequest, ChatResponse, ConciergeService};
use std::path::PathBuf;

/// Ask one question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub query: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "query")]
    pub file: Option<PathBuf>,

    /// Session id to continue
    #[arg(short, long)]
    pub session: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let query = self
            .get_query()?
            .ok_or_else(|| AppError::Config("No query provided".to_string()))?;

        let service = ConciergeService::from_config(config)?;

        let mut request = ChatRequest::new(query);
        if let Some(session) = &self.session {
            request = request.with_session(session.clone());
        }

        let response = service.handle(request).await?;

        if self.json {
            let json = serde_json::to_string_pretty(&response)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            print_response(&response);
        }

        Ok(())
    }

    fn get_query(&self) -> AppResult<Option<String>> {
        if let Some(query) = &self.query {
            return Ok(Some(query.clone()));
        }
        match &self.file {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }
}

/// Print a chat response as plain text.
pub(crate) fn print_response(response: &ChatResponse) {
    println!("{}", response.answer);

    if let Some(reply) = &response.handoff_reply {
        println!();
        println!("{}", reply);
    }

    if !response.response.citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, citation) in response.response.citations.iter().enumerate() {
            println!("  [{}] {} <{}>", i + 1, citation.title, citation.uri);
        }
    }

    if !response.response.related_questions.is_empty() {
        println!();
        println!("Related:");
        for question in &response.response.related_questions {
            println!("  - {}", question);
        }
    }

    // Backend outcomes go to stderr with the rest of the diagnostics
    for (id, report) in &response.response.backends {
        tracing::debug!(
            backend = %id,
            status = %report.status,
            latency_ms = report.latency_ms,
            "Backend report"
        );
    }
    tracing::debug!(
        session_id = %response.session_id,
        state = %response.state,
        consultant_needed = response.consultant_needed,
        degraded = response.response.degraded,
        "Response summary"
    );
}
