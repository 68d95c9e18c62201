//! Best-template resolution for a message

use super::{
    PromptTemplate, TemplateFactory, TemplateRepository, TemplateScored, TemplateScorer,
    DEFAULT_TEMPLATE_NAME, DEFAULT_TEMPLATE_TYPE,
};
use crate::analysis::Patterns;
use crate::store::StoreError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Substrings that mark content as code when no keyword matched
const CODE_MARKERS: &[&str] = &[
    "{", "}", "function", "class", "public", "private", "SELECT", "INSERT", "UPDATE", "DELETE",
];

/// Ordered keyword → template type table; the first keyword found in the
/// content (case-insensitive) decides the type
#[derive(Debug, Clone)]
pub struct KeywordTypeTable {
    entries: Vec<(String, String)>,
}

impl KeywordTypeTable {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(keyword, template_type)| (keyword.to_lowercase(), template_type))
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        const ENTRIES: &[(&str, &str)] = &[
            ("代码审查", "review"),
            ("code review", "review"),
            ("review", "review"),
            ("测试用例", "test"),
            ("单元测试", "test"),
            ("test case", "test"),
            ("unit test", "test"),
            ("sql优化", "sql"),
            ("数据库优化", "sql"),
            ("optimize sql", "sql"),
            ("代码生成", "code"),
            ("优化代码", "code"),
            ("重构代码", "code"),
            ("generate code", "code"),
            ("refactor", "code"),
            ("总结", "summary"),
            ("概括", "summary"),
            ("summarize", "summary"),
            ("数据分析", "analysis"),
            ("分析数据", "analysis"),
            ("analyze data", "analysis"),
            ("接口文档", "doc"),
            ("api", "doc"),
            ("如何解决", "qa"),
            ("问题", "qa"),
            ("how do i", "qa"),
        ];
        Self::new(
            ENTRIES
                .iter()
                .map(|(keyword, template_type)| (keyword.to_string(), template_type.to_string())),
        )
    }

    pub fn resolve(&self, content: &str) -> Option<&str> {
        let lower = content.to_lowercase();
        self.entries
            .iter()
            .find(|(keyword, _)| lower.contains(keyword.as_str()))
            .map(|(_, template_type)| template_type.as_str())
    }
}

/// Resolves the best template for a message. Never fails: repository errors
/// and empty candidate sets end in the default chat template.
pub struct TemplateSelector {
    repository: Arc<dyn TemplateRepository>,
    scorer: TemplateScorer,
    keywords: Arc<KeywordTypeTable>,
    stats: Option<mpsc::UnboundedSender<TemplateScored>>,
}

impl TemplateSelector {
    pub fn new(
        repository: Arc<dyn TemplateRepository>,
        patterns: Arc<Patterns>,
        keywords: Arc<KeywordTypeTable>,
    ) -> Self {
        Self {
            repository,
            scorer: TemplateScorer::new(patterns),
            keywords,
            stats: None,
        }
    }

    /// Report every scored selection on `sender`
    pub fn with_stats(mut self, sender: mpsc::UnboundedSender<TemplateScored>) -> Self {
        self.stats = Some(sender);
        self
    }

    pub fn scorer(&self) -> &TemplateScorer {
        &self.scorer
    }

    pub async fn find_best_template(&self, template_type: &str, content: &str) -> PromptTemplate {
        let candidates = match self.candidates(template_type, content).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Template lookup failed, using default");
                Vec::new()
            }
        };

        if candidates.is_empty() {
            return self.default_template().await;
        }

        let (best, score) = self.select_best(candidates, content);
        info!(template = %best.name, template_type = %best.template_type, score, "Template selected");
        self.report(&best, score);
        best
    }

    /// Type inferred from the content alone
    pub fn infer_type(&self, content: &str) -> Option<String> {
        if let Some(template_type) = self.keywords.resolve(content) {
            return Some(template_type.to_string());
        }
        if CODE_MARKERS.iter().any(|marker| content.contains(marker)) {
            return Some("code".to_string());
        }
        None
    }

    async fn candidates(
        &self,
        template_type: &str,
        content: &str,
    ) -> Result<Vec<PromptTemplate>, StoreError> {
        let templates = self.repository.find_by_type(template_type).await?;
        if !templates.is_empty() {
            return Ok(templates);
        }

        match self.infer_type(content) {
            Some(inferred) => {
                debug!(requested = template_type, %inferred, "No templates for type, inferred from content");
                self.repository.find_by_type(&inferred).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Highest score wins; ties keep the earlier candidate
    fn select_best(&self, candidates: Vec<PromptTemplate>, content: &str) -> (PromptTemplate, f64) {
        let mut best: Option<(PromptTemplate, f64)> = None;
        for template in candidates {
            let score = self.scorer.score(&template, content);
            match &best {
                Some((_, best_score)) if *best_score >= score => {}
                _ => best = Some((template, score)),
            }
        }
        // candidates is non-empty at every call site
        best.unwrap_or_else(|| (TemplateFactory::default_chat(), 0.0))
    }

    async fn default_template(&self) -> PromptTemplate {
        match self
            .repository
            .find_by_type_and_name(DEFAULT_TEMPLATE_TYPE, DEFAULT_TEMPLATE_NAME)
            .await
        {
            Ok(Some(template)) => template,
            Ok(None) => {
                debug!("Default chat template missing, synthesizing one");
                TemplateFactory::default_chat()
            }
            Err(e) => {
                warn!(error = %e, "Default template lookup failed, synthesizing one");
                TemplateFactory::default_chat()
            }
        }
    }

    fn report(&self, template: &PromptTemplate, score: f64) {
        if !template.is_persisted() {
            return;
        }
        if let Some(sender) = &self.stats {
            let event = TemplateScored {
                template_id: template.id,
                template_name: template.name.clone(),
                score,
            };
            if sender.send(event).is_err() {
                debug!("Stats aggregator stopped; usage not recorded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{builtin_templates, InMemoryTemplateStore};

    async fn selector_with(templates: Vec<PromptTemplate>) -> TemplateSelector {
        let store = InMemoryTemplateStore::seeded(templates).await;
        TemplateSelector::new(
            Arc::new(store),
            Arc::new(Patterns::compile().unwrap()),
            Arc::new(KeywordTypeTable::builtin()),
        )
    }

    #[test]
    fn test_keyword_table_first_match_wins() {
        let table = KeywordTypeTable::builtin();
        assert_eq!(table.resolve("Please REVIEW my SQL"), Some("review"));
        assert_eq!(table.resolve("请帮我总结这段话"), Some("summary"));
        assert_eq!(table.resolve("Write a unit test for the parser"), Some("test"));
        assert_eq!(table.resolve("nice weather"), None);
    }

    #[tokio::test]
    async fn test_exact_type_match() {
        let selector = selector_with(builtin_templates()).await;
        let template = selector
            .find_best_template("summary", "Long article text")
            .await;
        assert_eq!(template.name, "text_summary");
    }

    #[tokio::test]
    async fn test_code_content_prefers_code_template() {
        let selector = selector_with(builtin_templates()).await;
        let content = "Optimize this:\n```java\npublic class Foo { void run() {} }\n```";
        let template = selector.find_best_template("code", content).await;
        assert_eq!(template.template_type, "code");
    }

    #[tokio::test]
    async fn test_unknown_type_inferred_from_keywords() {
        let selector = selector_with(builtin_templates()).await;
        let template = selector
            .find_best_template("unknown", "Can you summarize this meeting?")
            .await;
        assert_eq!(template.name, "text_summary");
    }

    #[tokio::test]
    async fn test_unknown_type_inferred_from_code_markers() {
        let selector = selector_with(builtin_templates()).await;
        let template = selector
            .find_best_template("unknown", "fn main() { println!(\"hi\"); }")
            .await;
        assert_eq!(template.template_type, "code");
    }

    #[tokio::test]
    async fn test_falls_back_to_general_chat() {
        let selector = selector_with(builtin_templates()).await;
        let template = selector.find_best_template("unknown", "hello there").await;
        assert_eq!(template.name, "general_chat");
        assert!(template.is_persisted());
    }

    #[tokio::test]
    async fn test_empty_repository_synthesizes_default() {
        let selector = selector_with(Vec::new()).await;
        let template = selector.find_best_template("chat", "hello there").await;
        assert_eq!(template.name, "general_chat");
        assert_eq!(template.body, "{{content}}");
        assert!(!template.is_persisted());
    }

    #[tokio::test]
    async fn test_ties_keep_first_candidate() {
        let twin = |name: &str| {
            let mut t = TemplateFactory::create("misc", name, "{{content}}");
            t.description = String::new();
            t
        };
        let selector = selector_with(vec![twin("first"), twin("second")]).await;
        let template = selector.find_best_template("misc", "zz").await;
        assert_eq!(template.name, "first");
    }

    #[tokio::test]
    async fn test_selection_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let selector = selector_with(builtin_templates()).await.with_stats(tx);

        let template = selector.find_best_template("summary", "Some text").await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.template_id, template.id);
        assert_eq!(event.template_name, "text_summary");
        assert!(event.score > 0.0);
    }

    #[tokio::test]
    async fn test_fallback_is_not_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let selector = selector_with(Vec::new()).await.with_stats(tx);
        selector.find_best_template("chat", "hi").await;
        assert!(rx.try_recv().is_err());
    }
}
