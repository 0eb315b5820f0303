//! Backends command handler.
//!
//! Lists the configured search backends and which one is primary.

use clap::Args;
use concierge_core::{config::AppConfig, AppError, AppResult};
use concierge_engine::orchestrator::primary_backend;

/// List configured search backends
#[derive(Args, Debug)]
pub struct BackendsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl BackendsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing backends command");

        let enabled = config.enabled_backends();
        let primary = primary_backend(&enabled).map(|b| b.id.clone());

        if self.json {
            let output = serde_json::json!({
                "primary": primary,
                "deadlineMs": config.orchestrator.deadline_ms,
                "backends": config.backends,
            });
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        if config.backends.is_empty() {
            println!("No backends configured in {:?}", config.config_path());
            return Ok(());
        }

        println!(
            "{:<16} {:<10} {:>8} {:>10}  STATUS",
            "ID", "KIND", "PRIORITY", "TIMEOUT"
        );
        for backend in &config.backends {
            let status = if !backend.enabled {
                "disabled"
            } else if primary.as_deref() == Some(backend.id.as_str()) {
                "primary"
            } else {
                "enabled"
            };
            println!(
                "{:<16} {:<10} {:>8} {:>8}ms  {}",
                backend.id, backend.kind, backend.priority, backend.timeout_ms, status
            );
        }
        println!();
        println!("Fan-out deadline: {}ms", config.orchestrator.deadline_ms);

        Ok(())
    }
}
