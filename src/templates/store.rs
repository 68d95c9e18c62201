//! Template persistence

use super::PromptTemplate;
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Lookup and bookkeeping operations the selector and aggregator rely on.
/// Listing operations return templates in id order.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_all(&self) -> Result<Vec<PromptTemplate>, StoreError>;

    async fn find_by_type(&self, template_type: &str) -> Result<Vec<PromptTemplate>, StoreError>;

    async fn find_by_type_and_name(
        &self,
        template_type: &str,
        name: &str,
    ) -> Result<Option<PromptTemplate>, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<PromptTemplate>, StoreError>;

    /// Insert (id 0) or replace; returns the stored template with its id
    async fn save(&self, template: PromptTemplate) -> Result<PromptTemplate, StoreError>;

    /// Count one selection and fold `score` into the running mean atomically
    async fn record_usage(&self, id: u64, score: f64) -> Result<PromptTemplate, StoreError>;

    async fn find_by_estimated_tokens_between(
        &self,
        min: usize,
        max: usize,
    ) -> Result<Vec<PromptTemplate>, StoreError>;

    /// Highest usage count first
    async fn find_most_used(
        &self,
        template_type: &str,
        limit: usize,
    ) -> Result<Vec<PromptTemplate>, StoreError>;

    /// Highest average score first
    async fn find_best_performing(
        &self,
        template_type: &str,
        limit: usize,
    ) -> Result<Vec<PromptTemplate>, StoreError>;
}

/// A listing request against a [`TemplateRepository`]
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateQuery {
    All,
    ByType(String),
    MostUsed { template_type: String, limit: usize },
    BestPerforming { template_type: String, limit: usize },
    EstimatedTokens { min: usize, max: usize },
}

impl TemplateQuery {
    pub async fn run(
        &self,
        repository: &dyn TemplateRepository,
    ) -> Result<Vec<PromptTemplate>, StoreError> {
        match self {
            TemplateQuery::All => repository.find_all().await,
            TemplateQuery::ByType(template_type) => repository.find_by_type(template_type).await,
            TemplateQuery::MostUsed {
                template_type,
                limit,
            } => repository.find_most_used(template_type, *limit).await,
            TemplateQuery::BestPerforming {
                template_type,
                limit,
            } => repository.find_best_performing(template_type, *limit).await,
            TemplateQuery::EstimatedTokens { min, max } => {
                repository.find_by_estimated_tokens_between(*min, *max).await
            }
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<u64, PromptTemplate>,
    next_id: u64,
}

/// Process-local template repository
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    table: RwLock<Table>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the given templates, in order
    pub async fn seeded(templates: impl IntoIterator<Item = PromptTemplate>) -> Self {
        let store = Self::new();
        store.seed(templates).await;
        store
    }

    pub async fn seed(&self, templates: impl IntoIterator<Item = PromptTemplate>) {
        let mut table = self.table.write().await;
        for mut template in templates {
            table.next_id += 1;
            template.id = table.next_id;
            table.rows.insert(template.id, template);
        }
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.rows.is_empty()
    }

    async fn filter<F>(&self, predicate: F) -> Vec<PromptTemplate>
    where
        F: Fn(&PromptTemplate) -> bool + Send,
    {
        self.table
            .read()
            .await
            .rows
            .values()
            .filter(|t| predicate(t))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateStore {
    async fn find_all(&self) -> Result<Vec<PromptTemplate>, StoreError> {
        Ok(self.filter(|_| true).await)
    }

    async fn find_by_type(&self, template_type: &str) -> Result<Vec<PromptTemplate>, StoreError> {
        Ok(self.filter(|t| t.template_type == template_type).await)
    }

    async fn find_by_type_and_name(
        &self,
        template_type: &str,
        name: &str,
    ) -> Result<Option<PromptTemplate>, StoreError> {
        Ok(self
            .filter(|t| t.template_type == template_type && t.name == name)
            .await
            .into_iter()
            .next())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<PromptTemplate>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn save(&self, mut template: PromptTemplate) -> Result<PromptTemplate, StoreError> {
        let mut table = self.table.write().await;
        if template.id == 0 {
            table.next_id += 1;
            template.id = table.next_id;
        } else {
            table.next_id = table.next_id.max(template.id);
        }
        template.updated_at = Utc::now();
        table.rows.insert(template.id, template.clone());
        Ok(template)
    }

    async fn record_usage(&self, id: u64, score: f64) -> Result<PromptTemplate, StoreError> {
        let mut table = self.table.write().await;
        let template = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("template {}", id)))?;
        template.record_score(score);
        Ok(template.clone())
    }

    async fn find_by_estimated_tokens_between(
        &self,
        min: usize,
        max: usize,
    ) -> Result<Vec<PromptTemplate>, StoreError> {
        Ok(self
            .filter(|t| (min..=max).contains(&t.estimated_tokens))
            .await)
    }

    async fn find_most_used(
        &self,
        template_type: &str,
        limit: usize,
    ) -> Result<Vec<PromptTemplate>, StoreError> {
        let mut templates = self.find_by_type(template_type).await?;
        templates.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        templates.truncate(limit);
        Ok(templates)
    }

    async fn find_best_performing(
        &self,
        template_type: &str,
        limit: usize,
    ) -> Result<Vec<PromptTemplate>, StoreError> {
        let mut templates = self.find_by_type(template_type).await?;
        templates.sort_by(|a, b| {
            b.average_score
                .partial_cmp(&a.average_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        templates.truncate(limit);
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{builtin_templates, TemplateFactory};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_seeded_lookup() {
        let store = InMemoryTemplateStore::seeded(builtin_templates()).await;
        assert_eq!(store.len().await, 10);

        let code = store.find_by_type("code").await.unwrap();
        let names: Vec<_> = code.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["code_generation", "code_optimization"]);

        let chat = store
            .find_by_type_and_name("chat", "general_chat")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chat.id, 1);
        assert!(store.find_by_type("poetry").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_assigns_ids() {
        let store = InMemoryTemplateStore::new();
        let first = store
            .save(TemplateFactory::create("chat", "a", "{{content}}"))
            .await
            .unwrap();
        let second = store
            .save(TemplateFactory::create("chat", "b", "{{content}}"))
            .await
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let mut renamed = first.clone();
        renamed.description = "changed".into();
        store.save(renamed).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.find_by_id(1).await.unwrap().unwrap().description, "changed");
    }

    #[tokio::test]
    async fn test_record_usage_running_mean() {
        let store = InMemoryTemplateStore::seeded(builtin_templates()).await;
        store.record_usage(2, 120.0).await.unwrap();
        let updated = store.record_usage(2, 80.0).await.unwrap();

        assert_eq!(updated.usage_count, 2);
        assert!((updated.average_score - 100.0).abs() < 1e-9);
        assert!(matches!(
            store.record_usage(99, 1.0).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_usage_updates_are_not_lost() {
        let store = Arc::new(InMemoryTemplateStore::seeded(builtin_templates()).await);
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_usage(1, 10.0).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let template = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(template.usage_count, 50);
        assert!((template.average_score - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ranking_queries() {
        let store = InMemoryTemplateStore::seeded(builtin_templates()).await;
        // code_generation = 2, code_optimization = 3
        store.record_usage(3, 10.0).await.unwrap();
        store.record_usage(3, 10.0).await.unwrap();
        store.record_usage(2, 90.0).await.unwrap();

        let most_used = store.find_most_used("code", 1).await.unwrap();
        assert_eq!(most_used[0].name, "code_optimization");

        let best = store.find_best_performing("code", 2).await.unwrap();
        assert_eq!(best[0].name, "code_generation");
        assert_eq!(best.len(), 2);

        let mid = store.find_by_estimated_tokens_between(150, 160).await.unwrap();
        let names: Vec<_> = mid.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["code_generation", "api_doc", "test_case", "sql_optimization"]);
    }

    #[tokio::test]
    async fn test_queries_dispatch_to_repository() {
        let store = InMemoryTemplateStore::seeded(builtin_templates()).await;
        store.record_usage(3, 40.0).await.unwrap();

        let all = TemplateQuery::All.run(&store).await.unwrap();
        assert_eq!(all.len(), store.len().await);

        let code = TemplateQuery::ByType("code".into()).run(&store).await.unwrap();
        assert!(code.iter().all(|t| t.template_type == "code"));

        let most_used = TemplateQuery::MostUsed {
            template_type: "code".into(),
            limit: 1,
        }
        .run(&store)
        .await
        .unwrap();
        assert_eq!(most_used.len(), 1);
        assert_eq!(most_used[0].usage_count, 1);

        let best = TemplateQuery::BestPerforming {
            template_type: "code".into(),
            limit: 5,
        }
        .run(&store)
        .await
        .unwrap();
        assert_eq!(best[0].id, 3);

        let ranged = TemplateQuery::EstimatedTokens { min: 150, max: 160 }
            .run(&store)
            .await
            .unwrap();
        assert!(ranged.iter().all(|t| (150..=160).contains(&t.estimated_tokens)));
        assert!(TemplateQuery::ByType("nope".into()).run(&store).await.unwrap().is_empty());
    }
}
