//! Main prompt optimizer implementation

use super::{
    CompressionStrategy, OptimizationConfig, OptimizationStats, OptimizerError, StrategyKind,
    StrategySet,
};
use crate::analysis::{ContentAnalyzer, TokenEstimator};
use crate::templates::{PromptTemplate, CONTENT_PLACEHOLDER};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Final prompt and what it cost to get there
#[derive(Debug, Clone)]
pub struct OptimizationReport {
    pub prompt: String,
    pub stats: OptimizationStats,
    /// Why the original content was kept, when it was
    pub fallback: Option<String>,
}

impl OptimizationReport {
    /// Whether the prompt came out of a compression strategy
    pub fn applied(&self) -> bool {
        self.fallback.is_none()
    }
}

/// Renders templates and compresses the result under a token budget
pub struct PromptOptimizer {
    analyzer: Arc<ContentAnalyzer>,
    strategies: StrategySet,
    estimator: TokenEstimator,
    config: OptimizationConfig,
}

impl PromptOptimizer {
    pub fn new(analyzer: Arc<ContentAnalyzer>, config: OptimizationConfig) -> Self {
        let strategies = StrategySet::standard(analyzer.clone());
        Self::with_strategies(analyzer, strategies, config)
    }

    pub fn with_strategies(
        analyzer: Arc<ContentAnalyzer>,
        strategies: StrategySet,
        config: OptimizationConfig,
    ) -> Self {
        Self {
            analyzer,
            strategies,
            estimator: TokenEstimator::new(),
            config,
        }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Optimize a message with a template. Never fails: on any error the
    /// report carries the original content and the reason.
    pub fn optimize(
        &self,
        content: &str,
        template: &PromptTemplate,
        variables: &HashMap<String, String>,
    ) -> OptimizationReport {
        match self.try_optimize(content, template, variables) {
            Ok(report) => report,
            Err(e) => {
                warn!(template = %template.name, error = %e, "Optimization failed, using original content");
                let tokens = self.estimator.estimate(content);
                let mut stats = OptimizationStats::new(tokens, tokens);
                stats.template = Some(template.name.clone());
                OptimizationReport {
                    prompt: content.to_string(),
                    stats,
                    fallback: Some(e.to_string()),
                }
            }
        }
    }

    pub fn try_optimize(
        &self,
        content: &str,
        template: &PromptTemplate,
        variables: &HashMap<String, String>,
    ) -> Result<OptimizationReport, OptimizerError> {
        let rendered = apply_template(template, content, variables)?;

        let strategy = self.strategy_for(template.compression_strategy, &rendered);
        let budget = self.config.token_budget;
        let prompt = strategy.compress(&rendered, budget);
        if prompt.trim().is_empty() {
            return Err(OptimizerError::EmptyResult {
                strategy: strategy.kind(),
                budget,
            });
        }

        let mut stats = OptimizationStats::new(
            self.estimator.estimate(content),
            self.estimator.estimate(&prompt),
        );
        stats.strategy = Some(strategy.kind());
        stats.template = Some(template.name.clone());

        info!(
            template = %template.name,
            strategy = %strategy.kind(),
            original_tokens = stats.original_tokens,
            optimized_tokens = stats.optimized_tokens,
            "Prompt optimized ({:.1}% reduction)",
            stats.reduction_percent
        );

        Ok(OptimizationReport {
            prompt,
            stats,
            fallback: None,
        })
    }

    /// The declared strategy when it applies to the text, the auto-selected one otherwise
    fn strategy_for(&self, declared: StrategyKind, text: &str) -> &dyn CompressionStrategy {
        match self.strategies.get(declared) {
            Some(strategy) if strategy.is_applicable(text) => strategy,
            _ => {
                let selected = self.strategies.select(text);
                debug!(
                    declared = %declared,
                    selected = selected.name(),
                    "Declared strategy not applicable"
                );
                selected
            }
        }
    }

    /// Compress with the auto-selected strategy
    pub fn compress(&self, text: &str, max_tokens: usize) -> String {
        self.strategies.select(text).compress(text, max_tokens)
    }

    /// Compress with a specific strategy, applicable or not
    pub fn compress_with(
        &self,
        kind: StrategyKind,
        text: &str,
        max_tokens: usize,
    ) -> Result<String, OptimizerError> {
        let strategy = self
            .strategies
            .get(kind)
            .ok_or(OptimizerError::UnknownStrategy(kind))?;
        Ok(strategy.compress(text, max_tokens))
    }

    /// Fit context into `max_tokens` estimated tokens: code blocks first, then
    /// paragraphs. The first segment that does not fit is truncated by words
    /// (code blocks are never cut) and nothing after it is kept.
    pub fn compress_context(&self, context: &str, max_tokens: usize) -> String {
        let structure = self.analyzer.analyze_structure(context);
        if let Some(reason) = structure.error {
            warn!(%reason, "Context compression skipped");
            return context.to_string();
        }

        let segments = structure
            .code_blocks
            .iter()
            .map(|block| (block.as_str(), true))
            .chain(structure.paragraphs.iter().map(|p| (p.as_str(), false)));

        let mut kept: Vec<String> = Vec::new();
        let mut used = 0;
        for (segment, is_code) in segments {
            let cost = self.estimator.estimate(segment);
            if used + cost <= max_tokens {
                kept.push(segment.to_string());
                used += cost;
                continue;
            }

            if !is_code {
                let truncated = self.truncate_words(segment, max_tokens - used);
                if !truncated.is_empty() {
                    kept.push(truncated);
                }
            }
            break;
        }

        kept.join("\n")
    }

    fn truncate_words(&self, segment: &str, budget: usize) -> String {
        let mut words = Vec::new();
        let mut used = 0;
        for word in segment.split_whitespace() {
            let cost = self.estimator.estimate(word);
            if used + cost > budget {
                break;
            }
            used += cost;
            words.push(word);
        }
        words.join(" ")
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }
}

/// Substitute `{{key}}` variables (caller values over template defaults), then
/// the message itself into `{{content}}`
pub fn apply_template(
    template: &PromptTemplate,
    content: &str,
    variables: &HashMap<String, String>,
) -> Result<String, OptimizerError> {
    if !template.has_content_placeholder() {
        return Err(OptimizerError::MissingContentPlaceholder(
            template.name.clone(),
        ));
    }

    let mut merged: BTreeMap<&str, &str> = template
        .variables
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    merged.extend(variables.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let mut rendered = template.body.clone();
    for (key, value) in merged {
        if key == "content" {
            continue;
        }
        rendered = rendered.replace(&format!("{{{{{}}}}}", key), value);
    }

    Ok(rendered.replace(CONTENT_PLACEHOLDER, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Patterns;
    use crate::templates::TemplateFactory;

    fn optimizer(budget: usize) -> PromptOptimizer {
        let analyzer = Arc::new(ContentAnalyzer::new(Arc::new(Patterns::compile().unwrap())));
        PromptOptimizer::new(analyzer, OptimizationConfig { token_budget: budget })
    }

    #[test]
    fn test_apply_template_variables() {
        let template = TemplateFactory::create(
            "sql",
            "sql_optimization",
            "Optimize this {{dialect}} query ({{format}}):\n{{content}}",
        );
        let mut variables = HashMap::new();
        variables.insert("dialect".to_string(), "PostgreSQL".to_string());
        variables.insert("content".to_string(), "ignored".to_string());

        let rendered = apply_template(&template, "SELECT 1", &variables).unwrap();
        assert_eq!(rendered, "Optimize this PostgreSQL query (standard):\nSELECT 1");
    }

    #[test]
    fn test_apply_template_requires_placeholder() {
        let template = TemplateFactory::create("chat", "broken", "No slot here");
        assert!(matches!(
            apply_template(&template, "hi", &HashMap::new()),
            Err(OptimizerError::MissingContentPlaceholder(_))
        ));
    }

    #[test]
    fn test_content_is_not_reinterpreted() {
        let template = TemplateFactory::create("chat", "t", "Q: {{content}}");
        let mut variables = HashMap::new();
        variables.insert("name".to_string(), "Ada".to_string());

        let rendered = apply_template(&template, "Who is {{name}}?", &variables).unwrap();
        assert_eq!(rendered, "Q: Who is {{name}}?");
    }

    #[test]
    fn test_optimize_prose_with_large_budget() {
        let optimizer = optimizer(1024);
        let template = TemplateFactory::create("chat", "general_chat", "{{content}}");
        let report = optimizer.optimize("How do I sort a list? Thanks.", &template, &HashMap::new());
        assert!(report.applied());
        assert_eq!(report.prompt, "How do I sort a list Thanks");
    }

    #[test]
    fn test_optimize_falls_back_to_original() {
        let optimizer = optimizer(1);
        let template = TemplateFactory::create("chat", "general_chat", "{{content}}");
        let content = "This sentence is far too long for a budget of one token.";

        assert!(matches!(
            optimizer.try_optimize(content, &template, &HashMap::new()),
            Err(OptimizerError::EmptyResult { .. })
        ));
        let report = optimizer.optimize(content, &template, &HashMap::new());
        assert!(!report.applied());
        assert_eq!(report.prompt, content);
        assert_eq!(report.stats.tokens_saved, 0);
        assert_eq!(report.stats.strategy, None);

        let broken = TemplateFactory::create("chat", "broken", "no slot");
        let report = optimizer.optimize(content, &broken, &HashMap::new());
        assert_eq!(report.prompt, content);
        assert!(report.fallback.unwrap().contains("broken"));
    }

    #[test]
    fn test_declared_strategy_used_when_applicable() {
        let optimizer = optimizer(1024);
        let template = TemplateFactory::create("code", "code_review", "Review:\n{{content}}");
        let content = "Check this\n\n```rust\nfn main() {}\n```";

        let report = optimizer
            .try_optimize(content, &template, &HashMap::new())
            .unwrap();
        assert_eq!(report.stats.strategy, Some(StrategyKind::Keyword));
        assert!(report.prompt.starts_with("```rust\nfn main() {}\n```"));
        assert!(report.prompt.ends_with("Review Check this"));
        assert_eq!(report.stats.template.as_deref(), Some("code_review"));
    }

    #[test]
    fn test_declared_strategy_not_applicable_uses_selection() {
        let optimizer = optimizer(1024);
        // keyword declared, but the rendered prompt has no code block
        let template = TemplateFactory::create("code", "code_generation", "Write: {{content}}");
        let report = optimizer
            .try_optimize("a parser for dates.", &template, &HashMap::new())
            .unwrap();
        assert_eq!(report.stats.strategy, Some(StrategyKind::Semantic));
        assert_eq!(report.prompt, "Write: a parser for dates");
    }

    #[test]
    fn test_compress_with_unknown_strategy() {
        let analyzer = Arc::new(ContentAnalyzer::new(Arc::new(Patterns::compile().unwrap())));
        let semantic: Arc<dyn CompressionStrategy> =
            Arc::new(crate::optimization::SemanticStrategy::new(analyzer.clone()));
        let optimizer = PromptOptimizer::with_strategies(
            analyzer,
            StrategySet::new(Vec::new(), semantic),
            OptimizationConfig::default(),
        );

        assert!(optimizer.compress_with(StrategyKind::Semantic, "One. Two.", 10).is_ok());
        assert!(matches!(
            optimizer.compress_with(StrategyKind::Keyword, "x", 10),
            Err(OptimizerError::UnknownStrategy(StrategyKind::Keyword))
        ));
    }

    #[test]
    fn test_compress_context_code_first() {
        let optimizer = optimizer(0);
        let context = "intro words here\n\n```\nx\n```\n\nsecond para";
        let output = optimizer.compress_context(context, 1000);
        assert_eq!(output, "```\nx\n```\nintro words here\nsecond para");
    }

    #[test]
    fn test_compress_context_truncates_first_overflowing_paragraph() {
        let optimizer = optimizer(0);
        // "alpha beta" costs 9, "gamma delta" costs 10
        let context = "alpha beta\n\ngamma delta\n\nepsilon";
        let output = optimizer.compress_context(context, 14);
        assert_eq!(output, "alpha beta\ngamma");
    }

    #[test]
    fn test_compress_context_never_cuts_code() {
        let optimizer = optimizer(0);
        let context = "```\nlet value = compute(input);\n```\n\nshort";
        assert_eq!(optimizer.compress_context(context, 3), "");
    }

    #[test]
    fn test_compress_auto_selects() {
        let optimizer = optimizer(0);
        // the longer sentence carries more vocabulary and wins the budget
        let output = optimizer.compress("Keep me. Drop me too please now.", 5);
        assert_eq!(output, "Drop me too please now");
    }
}
