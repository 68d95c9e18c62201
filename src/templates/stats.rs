//! Usage statistics: scored selections are folded into the repository by a
//! single consumer task

use super::TemplateRepository;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A template was chosen with this score
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateScored {
    pub template_id: u64,
    pub template_name: String,
    pub score: f64,
}

pub struct StatsAggregator {
    repository: Arc<dyn TemplateRepository>,
    receiver: mpsc::UnboundedReceiver<TemplateScored>,
}

impl StatsAggregator {
    /// Create the aggregator and the sender selectors report on
    pub fn channel(
        repository: Arc<dyn TemplateRepository>,
    ) -> (mpsc::UnboundedSender<TemplateScored>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            sender,
            Self {
                repository,
                receiver,
            },
        )
    }

    /// Consume events until every sender is dropped; returns how many were applied
    pub async fn run(mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.receiver.recv().await {
            match self
                .repository
                .record_usage(event.template_id, event.score)
                .await
            {
                Ok(template) => {
                    applied += 1;
                    debug!(
                        template = %template.name,
                        usage_count = template.usage_count,
                        average_score = template.average_score,
                        "Template usage recorded"
                    );
                }
                Err(e) => warn!(
                    template = %event.template_name,
                    error = %e,
                    "Failed to record template usage"
                ),
            }
        }
        applied
    }

    pub fn spawn(self) -> JoinHandle<usize> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{builtin_templates, InMemoryTemplateStore};

    #[tokio::test]
    async fn test_aggregator_applies_events() {
        let store = Arc::new(InMemoryTemplateStore::seeded(builtin_templates()).await);
        let (sender, aggregator) = StatsAggregator::channel(store.clone());
        let handle = aggregator.spawn();

        for score in [90.0, 110.0] {
            sender
                .send(TemplateScored {
                    template_id: 1,
                    template_name: "general_chat".into(),
                    score,
                })
                .unwrap();
        }
        // unknown ids are logged and skipped
        sender
            .send(TemplateScored {
                template_id: 404,
                template_name: "ghost".into(),
                score: 1.0,
            })
            .unwrap();
        drop(sender);

        assert_eq!(handle.await.unwrap(), 2);
        let template = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(template.usage_count, 2);
        assert!((template.average_score - 100.0).abs() < 1e-9);
    }
}
