//! Template/content fit scoring
//!
//! Scores are unnormalized sums; only their ordering matters.

use super::PromptTemplate;
use crate::analysis::{Patterns, TokenEstimator};
use crate::optimization::StrategyKind;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const MAX_TOKEN_MATCH_SCORE: f64 = 100.0;
const CODE_FEATURE_SCORE: f64 = 50.0;
const SQL_FEATURE_MULTIPLIER: f64 = 1.5;
const STRATEGY_MATCH_SCORE: f64 = 30.0;
const KEYWORD_MATCH_WEIGHT: f64 = 0.8;

/// Words this short are ignored when comparing vocabularies
const MIN_OVERLAP_WORD_LEN: usize = 3;

/// Per-component view of one score, mostly for logging and the CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub token_match: f64,
    pub feature: f64,
    pub strategy: f64,
    pub keyword_overlap: usize,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct TemplateScorer {
    patterns: Arc<Patterns>,
    estimator: TokenEstimator,
}

impl TemplateScorer {
    pub fn new(patterns: Arc<Patterns>) -> Self {
        Self {
            patterns,
            estimator: TokenEstimator::new(),
        }
    }

    pub fn score(&self, template: &PromptTemplate, content: &str) -> f64 {
        self.breakdown(template, content).total
    }

    pub fn breakdown(&self, template: &PromptTemplate, content: &str) -> ScoreBreakdown {
        let has_code = self.patterns.has_code_features(content);

        let token_match = self.token_match(template, content);
        let feature = self.feature_score(template, content, has_code);
        let strategy = strategy_score(template.compression_strategy, has_code);
        let keyword_overlap = self.keyword_overlap(template, content);

        let total =
            token_match + feature + strategy + keyword_overlap as f64 * KEYWORD_MATCH_WEIGHT;

        debug!(
            template = %template.name,
            token_match,
            feature,
            strategy,
            keyword_overlap,
            total,
            "Template scored"
        );

        ScoreBreakdown {
            token_match,
            feature,
            strategy,
            keyword_overlap,
            total,
        }
    }

    fn token_match(&self, template: &PromptTemplate, content: &str) -> f64 {
        let content_tokens = self.estimator.estimate(content);
        let diff = content_tokens.abs_diff(template.estimated_tokens) as f64;
        (MAX_TOKEN_MATCH_SCORE - diff).max(0.0)
    }

    fn feature_score(&self, template: &PromptTemplate, content: &str, has_code: bool) -> f64 {
        // SQL is checked first since SQL content usually also looks like code
        if template.template_type.contains("sql") && self.patterns.has_sql_features(content) {
            return CODE_FEATURE_SCORE * SQL_FEATURE_MULTIPLIER;
        }
        if has_code && template.template_type.contains("code") {
            return CODE_FEATURE_SCORE;
        }
        0.0
    }

    /// Distinct words longer than three characters shared by the content and
    /// the template's name, description and body
    fn keyword_overlap(&self, template: &PromptTemplate, content: &str) -> usize {
        let content_words = self.vocabulary(content);
        if content_words.is_empty() {
            return 0;
        }

        let template_text = format!(
            "{} {} {}",
            template.name.replace('_', " "),
            template.description,
            template.body
        );
        self.vocabulary(&template_text)
            .intersection(&content_words)
            .count()
    }

    fn vocabulary(&self, text: &str) -> HashSet<String> {
        let lower = text.to_lowercase();
        self.patterns
            .words(&lower)
            .into_iter()
            .filter(|w| w.chars().count() > MIN_OVERLAP_WORD_LEN)
            .map(String::from)
            .collect()
    }
}

fn strategy_score(strategy: StrategyKind, has_code: bool) -> f64 {
    match strategy {
        StrategyKind::Semantic if !has_code => STRATEGY_MATCH_SCORE,
        StrategyKind::Keyword if has_code => STRATEGY_MATCH_SCORE,
        StrategyKind::Redundancy => STRATEGY_MATCH_SCORE / 2.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateFactory;

    fn scorer() -> TemplateScorer {
        TemplateScorer::new(Arc::new(Patterns::compile().unwrap()))
    }

    fn template(template_type: &str, strategy: StrategyKind, tokens: usize) -> PromptTemplate {
        let mut template = TemplateFactory::create(template_type, "t", "{{content}}");
        template.description = String::new();
        template.compression_strategy = strategy;
        template.estimated_tokens = tokens;
        template
    }

    #[test]
    fn test_token_match_is_clamped() {
        let scorer = scorer();
        // "hello" costs 5
        let close = template("misc", StrategyKind::Keyword, 5);
        let far = template("misc", StrategyKind::Keyword, 500);

        assert_eq!(scorer.breakdown(&close, "hello").token_match, 100.0);
        assert_eq!(scorer.breakdown(&far, "hello").token_match, 0.0);
    }

    #[test]
    fn test_sql_feature_short_circuits() {
        let scorer = scorer();
        let sql = template("sql", StrategyKind::Keyword, 100);
        let breakdown = scorer.breakdown(&sql, "public class Dao uses MySQL");
        assert_eq!(breakdown.feature, 75.0);

        let code = template("code", StrategyKind::Keyword, 100);
        assert_eq!(scorer.breakdown(&code, "public class Dao").feature, 50.0);
        assert_eq!(scorer.breakdown(&code, "a plain sentence").feature, 0.0);
    }

    #[test]
    fn test_strategy_component() {
        assert_eq!(strategy_score(StrategyKind::Semantic, false), 30.0);
        assert_eq!(strategy_score(StrategyKind::Semantic, true), 0.0);
        assert_eq!(strategy_score(StrategyKind::Keyword, true), 30.0);
        assert_eq!(strategy_score(StrategyKind::Keyword, false), 0.0);
        assert_eq!(strategy_score(StrategyKind::Redundancy, true), 15.0);
        assert_eq!(strategy_score(StrategyKind::Redundancy, false), 15.0);
    }

    #[test]
    fn test_keyword_overlap() {
        let scorer = scorer();
        let mut summary = template("summary", StrategyKind::Semantic, 100);
        summary.name = "text_summary".into();
        summary.body = "Summarize the following content:\n{{content}}".into();

        // shared: "text", "summary", "following"; "the" is too short
        let overlap = scorer.keyword_overlap(&summary, "Give me a summary of the following text");
        assert_eq!(overlap, 3);
        assert_eq!(scorer.keyword_overlap(&summary, ""), 0);
    }

    #[test]
    fn test_total_is_sum_of_components() {
        let scorer = scorer();
        let code = template("code", StrategyKind::Keyword, 0);
        let breakdown = scorer.breakdown(&code, "public class Foo {}");
        let expected = breakdown.token_match
            + breakdown.feature
            + breakdown.strategy
            + breakdown.keyword_overlap as f64 * KEYWORD_MATCH_WEIGHT;
        assert!((breakdown.total - expected).abs() < 1e-9);
        assert_eq!(scorer.score(&code, "public class Foo {}"), breakdown.total);
    }
}
