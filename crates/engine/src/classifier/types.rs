//! Classification result types.

use concierge_notify::SensitiveCategory;
use serde::{Deserialize, Serialize};

/// One rule that contributed to a category score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub category: SensitiveCategory,

    /// Matched keyword, or phrase terms joined with " … "
    pub rule: String,

    pub weight: f32,
}

/// Score of one detected category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: SensitiveCategory,
    pub score: f32,
}

/// Outcome of classifying one query.
///
/// `categories` holds every category whose score is above zero, in rule
/// table order; `confidence` is the highest of their scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub categories: Vec<SensitiveCategory>,
    pub scores: Vec<CategoryScore>,
    pub confidence: f32,
    pub evidence: Vec<Evidence>,
}

impl ClassificationResult {
    /// Result for a query that matched nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Whether the confidence reaches the handoff threshold.
    pub fn exceeds(&self, threshold: f32) -> bool {
        !self.categories.is_empty() && self.confidence >= threshold
    }

    /// Score of a single category, zero when not detected.
    pub fn score(&self, category: SensitiveCategory) -> f32 {
        self.scores
            .iter()
            .find(|s| s.category == category)
            .map(|s| s.score)
            .unwrap_or(0.0)
    }

    /// Matched rule texts, for display.
    pub fn matched_rules(&self) -> Vec<&str> {
        self.evidence.iter().map(|e| e.rule.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_exceeds() {
        let result = ClassificationResult::none();
        assert!(result.is_empty());
        assert!(!result.exceeds(0.0));
        assert_eq!(result.score(SensitiveCategory::Price), 0.0);
    }

    #[test]
    fn test_exceeds_is_inclusive() {
        let result = ClassificationResult {
            categories: vec![SensitiveCategory::Discount],
            scores: vec![CategoryScore {
                category: SensitiveCategory::Discount,
                score: 0.5,
            }],
            confidence: 0.5,
            evidence: Vec::new(),
        };
        assert!(result.exceeds(0.5));
        assert!(!result.exceeds(0.51));
        assert_eq!(result.score(SensitiveCategory::Discount), 0.5);
    }
}
