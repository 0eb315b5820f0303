//! Classify command handler.
//!
//! Scores a query against the sensitive-category rules without calling any
//! backend. Useful for tuning a rule table.

use clap::Args;
use concierge_core::{config::AppConfig, AppError, AppResult};
use concierge_engine::SensitiveQueryClassifier;

/// Classify a query without calling any backend
#[derive(Args, Debug)]
pub struct ClassifyCommand {
    /// The query to classify
    pub query: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ClassifyCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing classify command");

        let classifier = SensitiveQueryClassifier::from_config(config)?;
        let result = classifier.classify(&self.query);
        let handoff = classifier.requires_handoff(&result);

        if self.json {
            let output = serde_json::json!({
                "query": self.query,
                "threshold": classifier.threshold(),
                "handoff": handoff,
                "result": result,
            });
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        if result.is_empty() {
            println!("No sensitive categories detected");
        } else {
            for score in &result.scores {
                println!("{:<12} {:.2}", score.category, score.score);
            }
            println!();
            println!("Matched rules:");
            for evidence in &result.evidence {
                println!(
                    "  {:<12} {:<20} {:+.2}",
                    evidence.category, evidence.rule, evidence.weight
                );
            }
        }

        println!();
        println!(
            "Confidence {:.2} (threshold {:.2}): {}",
            result.confidence,
            classifier.threshold(),
            if handoff {
                "handoff to a human agent"
            } else {
                "answer automatically"
            }
        );

        Ok(())
    }
}
