//! Prompt templates: data model, factory defaults, scoring and selection
//!
//! A template wraps the user's message in task-specific instructions. The
//! selector picks one per message, the optimizer renders it, and every scored
//! selection flows back into the template's usage statistics through
//! [`StatsAggregator`].

mod catalog;
mod scoring;
mod selector;
mod stats;
mod store;

pub use catalog::{builtin_templates, load_catalog, CatalogEntry};
pub use scoring::{ScoreBreakdown, TemplateScorer};
pub use selector::{KeywordTypeTable, TemplateSelector};
pub use stats::{StatsAggregator, TemplateScored};
pub use store::{InMemoryTemplateStore, TemplateQuery, TemplateRepository};

use crate::optimization::StrategyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Placeholder the user's message is substituted into
pub const CONTENT_PLACEHOLDER: &str = "{{content}}";

pub const DEFAULT_TEMPLATE_TYPE: &str = "chat";
pub const DEFAULT_TEMPLATE_NAME: &str = "general_chat";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse template catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Template '{0}' has no {{{{content}}}} placeholder")]
    MissingPlaceholder(String),
}

/// A reusable prompt wrapper with its usage statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Zero until the template has been saved to a repository
    pub id: u64,
    pub name: String,
    pub description: String,
    pub template_type: String,
    /// Body text with `{{placeholder}}` markers
    pub body: String,
    /// Default variable values; caller-supplied variables take precedence
    pub variables: HashMap<String, String>,
    pub compression_strategy: StrategyKind,
    pub estimated_tokens: usize,
    pub usage_count: u64,
    /// Running mean of every selection score recorded for this template
    pub average_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptTemplate {
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    pub fn has_content_placeholder(&self) -> bool {
        self.body.contains(CONTENT_PLACEHOLDER)
    }

    /// Fold one more score into the running mean
    pub fn record_score(&mut self, score: f64) {
        self.usage_count += 1;
        let n = self.usage_count as f64;
        self.average_score = (self.average_score * (n - 1.0) + score) / n;
        self.updated_at = Utc::now();
    }
}

/// Builds templates with per-type defaults
pub struct TemplateFactory;

impl TemplateFactory {
    /// Defaults by type: code is keyword/200, chat is semantic/100, sql is
    /// keyword/150 with dialect variables, anything else semantic/100
    pub fn create(
        template_type: impl Into<String>,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> PromptTemplate {
        let template_type = template_type.into();
        let now = Utc::now();

        let (strategy, tokens, description, variables) = match template_type.as_str() {
            "code" => (StrategyKind::Keyword, 200, "Code related template", HashMap::new()),
            "chat" => (StrategyKind::Semantic, 100, "General conversation template", HashMap::new()),
            "sql" => (
                StrategyKind::Keyword,
                150,
                "SQL related template",
                HashMap::from([
                    ("dialect".to_string(), "MySQL".to_string()),
                    ("format".to_string(), "standard".to_string()),
                    ("include_comments".to_string(), "true".to_string()),
                ]),
            ),
            _ => (StrategyKind::Semantic, 100, "Default template", HashMap::new()),
        };

        PromptTemplate {
            id: 0,
            name: name.into(),
            description: description.to_string(),
            template_type,
            body: body.into(),
            variables,
            compression_strategy: strategy,
            estimated_tokens: tokens,
            usage_count: 0,
            average_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The chat template used when nothing else matches
    pub fn default_chat() -> PromptTemplate {
        Self::create(DEFAULT_TEMPLATE_TYPE, DEFAULT_TEMPLATE_NAME, CONTENT_PLACEHOLDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_defaults_by_type() {
        let code = TemplateFactory::create("code", "c", "{{content}}");
        assert_eq!(code.compression_strategy, StrategyKind::Keyword);
        assert_eq!(code.estimated_tokens, 200);

        let chat = TemplateFactory::create("chat", "c", "{{content}}");
        assert_eq!(chat.compression_strategy, StrategyKind::Semantic);
        assert_eq!(chat.estimated_tokens, 100);

        let sql = TemplateFactory::create("sql", "s", "{{content}}");
        assert_eq!(sql.compression_strategy, StrategyKind::Keyword);
        assert_eq!(sql.estimated_tokens, 150);
        assert_eq!(sql.variables["dialect"], "MySQL");
        assert_eq!(sql.variables["include_comments"], "true");

        let other = TemplateFactory::create("poetry", "p", "{{content}}");
        assert_eq!(other.compression_strategy, StrategyKind::Semantic);
        assert_eq!(other.estimated_tokens, 100);
        assert!(other.variables.is_empty());
    }

    #[test]
    fn test_default_chat() {
        let template = TemplateFactory::default_chat();
        assert_eq!(template.template_type, "chat");
        assert_eq!(template.name, "general_chat");
        assert_eq!(template.body, "{{content}}");
        assert!(!template.is_persisted());
        assert!(template.has_content_placeholder());
    }

    #[test]
    fn test_running_mean() {
        let mut template = TemplateFactory::default_chat();
        template.record_score(100.0);
        template.record_score(50.0);
        template.record_score(30.0);

        assert_eq!(template.usage_count, 3);
        assert!((template.average_score - 60.0).abs() < 1e-9);
    }
}
