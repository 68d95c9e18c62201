//! prompt-relay - Optimize chat prompts and relay streamed completions
//!
//! Sits between a chat client and an OpenAI-compatible provider. Before a
//! user message goes out, a prompt template is selected for it and the
//! rendered prompt is compressed under a token budget. The streamed answer is
//! then forwarded to the client delta by delta and persisted exactly once,
//! whether the stream finished, stalled or failed.
//!
//! ## Key Features
//!
//! - **Template selection**: keyword/type inference and heuristic scoring over a template catalog
//! - **Prompt compression**: semantic, keyword and redundancy strategies under a token budget
//! - **Streaming relay**: per-message task with inactivity and overall timeouts
//! - **Persistence**: final, partial or error text always written to the message store
//! - **Metrics Tracking**: session outcomes and tokens saved

pub mod analysis;
pub mod api;
pub mod config;
pub mod metrics;
pub mod optimization;
pub mod relay;
pub mod store;
pub mod templates;
pub mod tui;

pub use analysis::{ContentAnalyzer, ContentStructure, Patterns, TokenEstimator};
pub use api::{ApiError, ChatCompletionRequest, Upstream, UpstreamClient};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use metrics::{MetricsTracker, RelayMetrics};
pub use optimization::{OptimizationConfig, OptimizationStats, PromptOptimizer, StrategyKind};
pub use relay::{
    PromptPipeline, Relay, RelayConfig, RelayEvent, RelayHandle, RelayService, RelayState,
    SendRequest, SessionReport,
};
pub use store::{InMemoryMessageStore, JsonFileMessageStore, Message, MessageStore};
pub use templates::{
    InMemoryTemplateStore, PromptTemplate, TemplateRepository, TemplateSelector,
};
