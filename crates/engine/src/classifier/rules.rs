//! Rule table for the sensitive-query classifier.
//!
//! The table is plain data loaded from YAML and compiled once into matchers.

use concierge_core::{AppError, AppResult};
use concierge_notify::SensitiveCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Built-in rule table.
pub const DEFAULT_RULES: &str = include_str!("default_rules.yaml");

/// Rule table as written in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    pub categories: Vec<CategoryRules>,
}

/// Rules of one sensitive category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRules {
    pub name: SensitiveCategory,

    /// Divisor applied to the summed weights
    #[serde(default = "default_normalizer")]
    pub normalizer: f32,

    #[serde(default)]
    pub keywords: Vec<KeywordRule>,

    #[serde(default)]
    pub phrases: Vec<PhraseRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub term: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseRule {
    pub terms: Vec<String>,

    /// Maximum characters between the end of one term and the start of the next
    #[serde(default = "default_window")]
    pub window: usize,

    pub weight: f32,
}

fn default_normalizer() -> f32 {
    1.0
}

fn default_window() -> usize {
    10
}

impl RuleTable {
    /// Parse a rule table from YAML text.
    pub fn from_yaml(yaml: &str) -> AppResult<Self> {
        let table: RuleTable = serde_yaml::from_str(yaml)
            .map_err(|e| AppError::Config(format!("Failed to parse classifier rules: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    /// Load a rule table from a YAML file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read classifier rules {:?}: {}", path, e))
        })?;
        let table = Self::from_yaml(&contents)?;
        tracing::info!(
            "Loaded {} classifier categories from {:?}",
            table.categories.len(),
            path
        );
        Ok(table)
    }

    /// The compiled-in table.
    pub fn builtin() -> AppResult<Self> {
        Self::from_yaml(DEFAULT_RULES)
    }

    fn validate(&self) -> AppResult<()> {
        let mut names = HashSet::new();
        for category in &self.categories {
            if !names.insert(category.name) {
                return Err(AppError::Config(format!(
                    "Duplicate classifier category: {}",
                    category.name
                )));
            }
            if category.normalizer.is_nan() || category.normalizer <= 0.0 {
                return Err(AppError::Config(format!(
                    "Category '{}' normalizer must be positive",
                    category.name
                )));
            }
            if category.keywords.iter().any(|k| k.term.trim().is_empty()) {
                return Err(AppError::Config(format!(
                    "Category '{}' has an empty keyword",
                    category.name
                )));
            }
            for phrase in &category.phrases {
                if phrase.terms.len() < 2 || phrase.terms.iter().any(|t| t.trim().is_empty()) {
                    return Err(AppError::Config(format!(
                        "Category '{}' has a phrase rule that needs two or more non-empty terms",
                        category.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A compiled keyword matcher.
#[derive(Debug, Clone)]
pub(crate) struct KeywordMatcher {
    pub term: String,
    pub weight: f32,
    whole_word: bool,
}

impl KeywordMatcher {
    fn new(rule: &KeywordRule) -> Self {
        let term = rule.term.trim().to_lowercase();
        let whole_word = term.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ');
        Self {
            term,
            weight: rule.weight,
            whole_word,
        }
    }

    /// Match against an already lowercased query.
    pub fn matches(&self, text: &str) -> bool {
        if !self.whole_word {
            return text.contains(&self.term);
        }
        text.match_indices(&self.term)
            .any(|(start, _)| is_word_bounded(text, start, start + self.term.len()))
    }
}

/// A compiled ordered-terms matcher.
#[derive(Debug, Clone)]
pub(crate) struct PhraseMatcher {
    pub terms: Vec<String>,
    pub window: usize,
    pub weight: f32,
}

impl PhraseMatcher {
    fn new(rule: &PhraseRule) -> Self {
        Self {
            terms: rule.terms.iter().map(|t| t.trim().to_lowercase()).collect(),
            window: rule.window,
            weight: rule.weight,
        }
    }

    /// Match against an already lowercased query.
    pub fn matches(&self, text: &str) -> bool {
        match_from(text, &self.terms, 0, None, self.window)
    }

    pub fn label(&self) -> String {
        self.terms.join(" … ")
    }
}

/// Try every occurrence of `terms[0]` at or after `from`; when `prev_end` is
/// set the occurrence must begin within `window` characters of it.
fn match_from(
    text: &str,
    terms: &[String],
    from: usize,
    prev_end: Option<usize>,
    window: usize,
) -> bool {
    let Some((first, rest)) = terms.split_first() else {
        return true;
    };

    for (offset, _) in text[from..].match_indices(first.as_str()) {
        let start = from + offset;
        if let Some(end) = prev_end {
            if text[end..start].chars().count() > window {
                // Later occurrences are even farther away.
                return false;
            }
        }
        if match_from(text, rest, start + first.len(), Some(start + first.len()), window) {
            return true;
        }
    }
    false
}

fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.map_or(false, |c| c.is_ascii_alphanumeric())
        && !after.map_or(false, |c| c.is_ascii_alphanumeric())
}

/// Compiled rules of one category.
#[derive(Debug, Clone)]
pub(crate) struct CompiledCategory {
    pub name: SensitiveCategory,
    pub normalizer: f32,
    pub keywords: Vec<KeywordMatcher>,
    pub phrases: Vec<PhraseMatcher>,
}

/// Compile a validated table into matchers.
pub(crate) fn compile(table: &RuleTable) -> Vec<CompiledCategory> {
    table
        .categories
        .iter()
        .map(|category| CompiledCategory {
            name: category.name,
            normalizer: category.normalizer,
            keywords: category.keywords.iter().map(KeywordMatcher::new).collect(),
            phrases: category.phrases.iter().map(PhraseMatcher::new).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword(term: &str) -> KeywordMatcher {
        KeywordMatcher::new(&KeywordRule {
            term: term.to_string(),
            weight: 1.0,
        })
    }

    fn phrase(terms: &[&str], window: usize) -> PhraseMatcher {
        PhraseMatcher::new(&PhraseRule {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            window,
            weight: 1.0,
        })
    }

    #[test]
    fn test_builtin_table_parses() {
        let table = RuleTable::builtin().unwrap();
        let names: Vec<_> = table.categories.iter().map(|c| c.name).collect();
        assert_eq!(names, SensitiveCategory::ALL.to_vec());
    }

    #[test]
    fn test_korean_keyword_is_substring() {
        assert!(keyword("할인").matches("이 제품 할인되나요?"));
        assert!(!keyword("할인").matches("이 제품 좋나요?"));
    }

    #[test]
    fn test_ascii_keyword_needs_word_boundary() {
        let sale = keyword("sale");
        assert!(sale.matches("is there a sale?"));
        assert!(sale.matches("세일sale"));
        assert!(!sale.matches("wholesale pricing"));
        assert!(keyword("GDPR").matches("gdpr 준수 여부"));
    }

    #[test]
    fn test_phrase_respects_order_and_window() {
        let rule = phrase(&["비용", "얼마"], 5);
        assert!(rule.matches("비용이 얼마인가요"));
        assert!(!rule.matches("얼마나 비용이 드나요"));
        assert!(!rule.matches("비용은 사용량에 따라 다르고 얼마"));
    }

    #[test]
    fn test_phrase_tries_later_occurrences() {
        let rule = phrase(&["가격", "어떻"], 3);
        assert!(rule.matches("가격표 말고 가격이 어떻게 되나요"));
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        assert!(RuleTable::from_yaml("categories:\n  - name: price\n  - name: price\n").is_err());
        assert!(
            RuleTable::from_yaml("categories:\n  - name: price\n    normalizer: 0\n").is_err()
        );
        assert!(RuleTable::from_yaml(
            "categories:\n  - name: price\n    phrases:\n      - { terms: [\"x\"], weight: 1 }\n"
        )
        .is_err());
        assert!(RuleTable::from_yaml("categories: {}").is_err());
    }

    #[test]
    fn test_unknown_category_name_rejected() {
        let err = RuleTable::from_yaml(
            "categories:\n  - name: discout\n    keywords:\n      - { term: \"할인\", weight: 1 }\n",
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("classifier rules"));
    }
}
