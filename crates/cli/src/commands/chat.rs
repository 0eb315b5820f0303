//! Chat command handler.
//!
//! Reads questions from stdin line by line and keeps them on one session.

use super::ask::print_response;
use clap::Args;
use concierge_core::{config::AppConfig, AppError, AppResult};
use concierge_engine::{ChatRequest, ConciergeService};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive conversation on one session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Session id to continue (a new one is generated otherwise)
    #[arg(short, long)]
    pub session: Option<String>,
}

impl ChatCommand {
    /// Execute the chat command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let service = ConciergeService::from_config(config)?;
        let mut session = self.session.clone();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        eprintln!("Type a question, or 'exit' to quit.");

        loop {
            print!("> ");
            std::io::stdout().flush().ok();

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            if matches!(query, "exit" | "quit") {
                break;
            }

            let mut request = ChatRequest::new(query);
            if let Some(id) = &session {
                request = request.with_session(id.clone());
            }

            match service.handle(request).await {
                Ok(response) => {
                    if session.is_none() {
                        eprintln!("Session: {}", response.session_id);
                        session = Some(response.session_id.clone());
                    }
                    print_response(&response);
                    println!();
                }
                Err(e @ AppError::AuthUnavailable(_)) => {
                    eprintln!("Error: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(id) = &session {
            if let Some(state) = service.sessions().get(id).await {
                tracing::info!(
                    session_id = %id,
                    turns = state.total_turns(),
                    state = %state.state(),
                    "Chat ended"
                );
            }
        }

        Ok(())
    }
}
