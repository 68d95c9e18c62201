//! Send a user message: prepare the prompt, open the upstream call and relay
//! the answer on a per-message task

use super::{Relay, RelayEvent, SessionReport, StreamSession, Termination, INIT_MESSAGE};
use crate::api::{ChatCompletionRequest, Upstream, UpstreamResponse};
use crate::config::ProviderSettings;
use crate::metrics::MetricsTracker;
use crate::optimization::PromptOptimizer;
use crate::store::Message;
use crate::templates::TemplateSelector;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

/// A user message to forward
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub conversation_id: String,
    /// Id of the assistant message the answer is written to
    pub message_id: String,
    pub content: String,
    /// Template type; inferred from the content when absent
    pub template_type: Option<String>,
    pub variables: HashMap<String, String>,
}

impl SendRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            content: content.into(),
            template_type: None,
            variables: HashMap::new(),
        }
    }

    pub fn with_template_type(mut self, template_type: impl Into<String>) -> Self {
        self.template_type = Some(template_type.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Consumer side of one relay session
pub struct RelayHandle {
    pub events: mpsc::Receiver<RelayEvent>,
    pub task: JoinHandle<SessionReport>,
}

impl RelayHandle {
    /// Events framed as server-sent events. The session task is detached and
    /// still persists its outcome.
    pub fn into_sse(self) -> impl Stream<Item = String> {
        ReceiverStream::new(self.events).map(|event| event.to_sse())
    }
}

/// Template selection followed by optimization
pub struct PromptPipeline {
    selector: TemplateSelector,
    optimizer: PromptOptimizer,
    default_type: String,
}

impl PromptPipeline {
    pub fn new(
        selector: TemplateSelector,
        optimizer: PromptOptimizer,
        default_type: impl Into<String>,
    ) -> Self {
        Self {
            selector,
            optimizer,
            default_type: default_type.into(),
        }
    }

    /// Final prompt for `request`; the raw content whenever optimization fails
    pub async fn prepare(&self, request: &SendRequest, metrics: Option<&MetricsTracker>) -> String {
        let template_type = request
            .template_type
            .clone()
            .or_else(|| self.selector.infer_type(&request.content))
            .unwrap_or_else(|| self.default_type.clone());

        let template = self
            .selector
            .find_best_template(&template_type, &request.content)
            .await;

        let report = self
            .optimizer
            .optimize(&request.content, &template, &request.variables);
        if let (true, Some(metrics)) = (report.applied(), metrics) {
            metrics.record_optimization(&report.stats);
        }
        report.prompt
    }
}

/// Entry point for sending messages. Cheap to clone; every message runs on
/// its own task.
#[derive(Clone)]
pub struct RelayService {
    upstream: Arc<dyn Upstream>,
    relay: Arc<Relay>,
    provider: Arc<ProviderSettings>,
    pipeline: Option<Arc<PromptPipeline>>,
    metrics: Option<MetricsTracker>,
}

impl RelayService {
    pub fn new(upstream: Arc<dyn Upstream>, relay: Relay, provider: ProviderSettings) -> Self {
        Self {
            upstream,
            relay: Arc::new(relay),
            provider: Arc::new(provider),
            pipeline: None,
            metrics: None,
        }
    }

    pub fn with_pipeline(mut self, pipeline: PromptPipeline) -> Self {
        self.pipeline = Some(Arc::new(pipeline));
        self
    }

    /// Record prompt optimization savings
    pub fn with_metrics(mut self, metrics: MetricsTracker) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Start relaying `request`. Events arrive on the handle in order: `init`,
    /// deltas, then exactly one `done` or `error`. Dropping the receiver
    /// cancels the session, which still persists its outcome.
    pub fn send_message(&self, request: SendRequest) -> RelayHandle {
        let (sender, events) = mpsc::channel(self.relay.config().channel_capacity);
        let service = self.clone();
        let task = tokio::spawn(async move { service.run(request, sender).await });
        RelayHandle { events, task }
    }

    async fn run(self, request: SendRequest, downstream: mpsc::Sender<RelayEvent>) -> SessionReport {
        let deadline = self.relay.deadline();
        let session = StreamSession::new(Message::assistant(
            request.message_id.as_str(),
            request.conversation_id.as_str(),
        ));
        info!(
            message_id = %request.message_id,
            conversation_id = %request.conversation_id,
            "Relay session started"
        );

        if downstream
            .send(RelayEvent::Init(INIT_MESSAGE.to_string()))
            .await
            .is_err()
        {
            return self
                .relay
                .conclude(session, Termination::Disconnected, &downstream)
                .await;
        }

        let prompt = match &self.pipeline {
            Some(pipeline) => pipeline.prepare(&request, self.metrics.as_ref()).await,
            None => request.content.clone(),
        };
        let chat = self.chat_request(prompt);
        debug!(message_id = %request.message_id, model = %chat.model, "Opening upstream");

        let inactivity = self.relay.config().inactivity_timeout;
        let opened = tokio::select! {
            biased;
            _ = downstream.closed() => Err(Termination::Disconnected),
            _ = sleep_until(deadline) => Err(Termination::DeadlineExceeded),
            result = timeout(inactivity, self.upstream.open(&chat)) => match result {
                Err(_) => {
                    warn!(message_id = %request.message_id, ?inactivity, "No upstream response within the inactivity timeout");
                    Err(Termination::Stalled)
                }
                Ok(Ok(UpstreamResponse::Stream(lines))) => Ok(lines),
                Ok(Ok(UpstreamResponse::Rejected { status, body })) => {
                    Err(Termination::Rejected { status, body })
                }
                Ok(Err(e)) => Err(Termination::Failed(e.to_string())),
            },
        };

        match opened {
            Ok(lines) => self.relay.stream(session, lines, &downstream, deadline).await,
            Err(termination) => self.relay.conclude(session, termination, &downstream).await,
        }
    }

    fn chat_request(&self, prompt: String) -> ChatCompletionRequest {
        let request =
            ChatCompletionRequest::streaming(self.provider.model.as_str(), self.provider.max_tokens)
                .with_system(self.provider.system_prompt.as_str())
                .with_user(prompt);
        match self.provider.temperature {
            Some(temperature) => request.with_temperature(temperature),
            None => request,
        }
    }
}
