//! Sensitive-query classifier.
//!
//! Decides whether a query touches a topic a human agent must handle
//! (specific pricing, discounts, contracts, privacy, or an explicit request
//! for a person). Scoring is driven entirely by a [`RuleTable`]; the
//! classifier itself holds no per-category logic.

pub mod rules;
pub mod types;

pub use rules::{CategoryRules, KeywordRule, PhraseRule, RuleTable};
pub use concierge_notify::SensitiveCategory;
pub use types::{CategoryScore, ClassificationResult, Evidence};

use concierge_core::config::ClassifierConfig;
use concierge_core::{AppConfig, AppResult};
use rules::CompiledCategory;

/// Rule-based classifier. Immutable once built; share it freely.
#[derive(Debug, Clone)]
pub struct SensitiveQueryClassifier {
    categories: Vec<CompiledCategory>,
    threshold: f32,
}

impl SensitiveQueryClassifier {
    pub fn new(table: &RuleTable, threshold: f32) -> Self {
        Self {
            categories: rules::compile(table),
            threshold,
        }
    }

    /// Classifier over the compiled-in rule table.
    pub fn with_default_rules(threshold: f32) -> AppResult<Self> {
        Ok(Self::new(&RuleTable::builtin()?, threshold))
    }

    /// Build from configuration, loading the override table when one is set.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let settings: &ClassifierConfig = &config.classifier;
        let table = match &settings.rules_path {
            Some(path) => RuleTable::load(&config.resolve_path(path))?,
            None => RuleTable::builtin()?,
        };
        Ok(Self::new(&table, settings.threshold))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Categories in table order.
    pub fn categories(&self) -> Vec<SensitiveCategory> {
        self.categories.iter().map(|c| c.name).collect()
    }

    /// Whether a result calls for a human handoff.
    pub fn requires_handoff(&self, result: &ClassificationResult) -> bool {
        result.exceeds(self.threshold)
    }

    /// Score a query against every category.
    ///
    /// Deterministic: the same query always yields an identical result.
    pub fn classify(&self, query: &str) -> ClassificationResult {
        let text = query.trim().to_lowercase();
        if text.is_empty() {
            return ClassificationResult::none();
        }

        let mut result = ClassificationResult::none();

        for category in &self.categories {
            let mut sum = 0.0f32;
            let mut evidence = Vec::new();

            for keyword in category.keywords.iter().filter(|k| k.matches(&text)) {
                sum += keyword.weight;
                evidence.push(Evidence {
                    category: category.name,
                    rule: keyword.term.clone(),
                    weight: keyword.weight,
                });
            }

            for phrase in category.phrases.iter().filter(|p| p.matches(&text)) {
                sum += phrase.weight;
                evidence.push(Evidence {
                    category: category.name,
                    rule: phrase.label(),
                    weight: phrase.weight,
                });
            }

            let score = (sum / category.normalizer).clamp(0.0, 1.0);
            if score > 0.0 {
                result.categories.push(category.name);
                result.scores.push(CategoryScore {
                    category: category.name,
                    score,
                });
                result.evidence.extend(evidence);
                result.confidence = result.confidence.max(score);
            }
        }

        tracing::debug!(
            categories = ?result.categories,
            confidence = result.confidence,
            "Classified query"
        );

        result
    }
}
