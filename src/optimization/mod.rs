//! Prompt optimization: template rendering plus budgeted compression

mod optimizer;
mod semantic;
mod strategies;

pub use optimizer::{apply_template, OptimizationReport, PromptOptimizer};
pub use semantic::{ScoredSentence, SemanticCompressor};
pub use strategies::{
    CompressionStrategy, KeywordStrategy, RedundancyStrategy, SemanticStrategy, StrategySet,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Template '{0}' has no {{{{content}}}} placeholder")]
    MissingContentPlaceholder(String),

    #[error("Compression with '{strategy}' produced an empty prompt (budget {budget})")]
    EmptyResult { strategy: StrategyKind, budget: usize },

    #[error("Strategy '{0}' is not registered")]
    UnknownStrategy(StrategyKind),
}

/// Compression strategy a template declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Semantic,
    Keyword,
    Redundancy,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Semantic => "semantic",
            StrategyKind::Keyword => "keyword",
            StrategyKind::Redundancy => "redundancy",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "semantic" => Ok(StrategyKind::Semantic),
            "keyword" => Ok(StrategyKind::Keyword),
            "redundancy" => Ok(StrategyKind::Redundancy),
            other => Err(format!("unknown compression strategy: {}", other)),
        }
    }
}

/// Configuration for optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Whitespace-token budget handed to the compression strategy
    pub token_budget: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self { token_budget: 1024 }
    }
}

/// Statistics about optimization results
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizationStats {
    pub original_tokens: usize,
    pub optimized_tokens: usize,
    pub tokens_saved: usize,
    /// Percentage of estimated tokens removed; negative when the template adds more than
    /// compression removes
    pub reduction_percent: f64,
    pub strategy: Option<StrategyKind>,
    pub template: Option<String>,
}

impl OptimizationStats {
    pub fn new(original: usize, optimized: usize) -> Self {
        let saved = original.saturating_sub(optimized);
        let reduction = if original > 0 {
            (original as f64 - optimized as f64) * 100.0 / original as f64
        } else {
            0.0
        };

        Self {
            original_tokens: original,
            optimized_tokens: optimized,
            tokens_saved: saved,
            reduction_percent: reduction,
            strategy: None,
            template: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("Keyword".parse::<StrategyKind>(), Ok(StrategyKind::Keyword));
        assert_eq!(" semantic ".parse::<StrategyKind>(), Ok(StrategyKind::Semantic));
        assert!("zip".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_stats_reduction() {
        let stats = OptimizationStats::new(200, 50);
        assert_eq!(stats.tokens_saved, 150);
        assert!((stats.reduction_percent - 75.0).abs() < 1e-9);

        let grown = OptimizationStats::new(10, 20);
        assert_eq!(grown.tokens_saved, 0);
        assert!(grown.reduction_percent < 0.0);

        assert_eq!(OptimizationStats::new(0, 0).reduction_percent, 0.0);
    }
}
