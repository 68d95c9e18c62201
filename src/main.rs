//! prompt-relay CLI - Optimize prompts and relay streamed completions

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prompt_relay::{
    analysis::{ContentAnalyzer, Patterns, TokenEstimator},
    api::UpstreamClient,
    config::{Config, ConfigError, API_KEY_ENV, BASE_URL_ENV, MODEL_ENV},
    metrics::MetricsTracker,
    optimization::{OptimizationConfig, PromptOptimizer, StrategyKind},
    relay::{PromptPipeline, Relay, RelayConfig, RelayService, RelayState, SendRequest},
    store::JsonFileMessageStore,
    templates::{
        builtin_templates, load_catalog, InMemoryTemplateStore, KeywordTypeTable, PromptTemplate,
        ScoreBreakdown, StatsAggregator, TemplateQuery, TemplateSelector,
    },
    tui::{self, TerminalRenderer},
};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "prompt-relay")]
#[command(about = "Optimize chat prompts and relay streamed completions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Config file (default: ~/.config/prompt-relay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a message and stream the model's answer
    Send {
        /// Message text, a file path, or - for stdin
        input: String,

        /// Template type (inferred from the message when omitted)
        #[arg(short = 't', long = "type")]
        template_type: Option<String>,

        /// Template variables as key=value
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Conversation id
        #[arg(long, default_value = "cli")]
        conversation: String,

        /// Assistant message id (default: generated)
        #[arg(long)]
        message_id: Option<String>,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Skip template selection and compression
        #[arg(long)]
        no_optimize: bool,
    },

    /// Render and compress a message without sending it
    Optimize {
        /// Message text, a file path, or - for stdin
        input: String,

        /// Template type (inferred from the message when omitted)
        #[arg(short = 't', long = "type")]
        template_type: Option<String>,

        /// Token budget (overrides config)
        #[arg(short, long)]
        budget: Option<usize>,

        /// Template variables as key=value
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the structure of a text: code blocks, paragraphs, languages
    Analyze {
        /// Text, a file path, or - for stdin
        input: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Estimate token count, optionally fitting the text into a budget
    Estimate {
        /// Text, a file path, or - for stdin
        input: String,

        /// Fit the text into this many tokens (code blocks first)
        #[arg(long)]
        fit: Option<usize>,

        /// Compress with this strategy instead of fitting
        #[arg(long, requires = "fit")]
        strategy: Option<StrategyKind>,

        /// Compress with the strategy picked for the text instead of fitting
        #[arg(long, requires = "fit", conflicts_with = "strategy")]
        auto: bool,
    },

    /// List templates, or score them against a message
    Templates {
        /// Only this template type
        #[arg(short = 't', long = "type")]
        template_type: Option<String>,

        /// Score every template against this text and show the pick
        #[arg(long = "for")]
        content: Option<String>,

        /// Only the N most used templates of --type
        #[arg(long, value_name = "N", requires = "template_type", conflicts_with_all = ["best", "tokens"])]
        most_used: Option<usize>,

        /// Only the N best scoring templates of --type
        #[arg(long, value_name = "N", requires = "template_type", conflicts_with = "tokens")]
        best: Option<usize>,

        /// Only templates whose estimated size is within MIN-MAX tokens
        #[arg(long, value_name = "MIN-MAX", value_parser = parse_range)]
        tokens: Option<(usize, usize)>,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show {
        /// Show only one section (provider, relay, optimization, templates, store)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

fn parse_range(s: &str) -> Result<(usize, usize), String> {
    let (min, max) = s
        .split_once('-')
        .ok_or_else(|| format!("expected MIN-MAX, got '{}'", s))?;
    let min: usize = min.trim().parse().map_err(|e| format!("bad minimum: {}", e))?;
    let max: usize = max.trim().parse().map_err(|e| format!("bad maximum: {}", e))?;
    if min > max {
        return Err(format!("minimum {} is above maximum {}", min, max));
    }
    Ok((min, max))
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("variable name is empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Send {
            input,
            template_type,
            vars,
            conversation,
            message_id,
            model,
            no_optimize,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(model) = model {
                config.provider.model = model;
            }
            if no_optimize {
                config.optimization.enabled = false;
            }
            let mut request = SendRequest::new(
                conversation,
                message_id.unwrap_or_else(generate_message_id),
                read_input(&input)?,
            );
            request.template_type = template_type;
            request.variables = vars.into_iter().collect();
            run_send(config, request).await?;
        }
        Commands::Optimize {
            input,
            template_type,
            budget,
            vars,
            output,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(budget) = budget {
                config.optimization.token_budget = budget;
            }
            let content = read_input(&input)?;
            run_optimize(config, content, template_type, vars.into_iter().collect(), output)
                .await?;
        }
        Commands::Analyze { input, json } => {
            run_analyze(&read_input(&input)?, json)?;
        }
        Commands::Estimate {
            input,
            fit,
            strategy,
            auto,
        } => {
            let config = load_config(&cli.config)?;
            run_estimate(&config, &read_input(&input)?, fit, strategy, auto)?;
        }
        Commands::Templates {
            template_type,
            content,
            most_used,
            best,
            tokens,
        } => {
            let config = load_config(&cli.config)?;
            let query = match (&template_type, most_used, best, tokens) {
                (Some(t), Some(limit), _, _) => TemplateQuery::MostUsed {
                    template_type: t.clone(),
                    limit,
                },
                (Some(t), None, Some(limit), _) => TemplateQuery::BestPerforming {
                    template_type: t.clone(),
                    limit,
                },
                (_, _, _, Some((min, max))) => TemplateQuery::EstimatedTokens { min, max },
                (Some(t), _, _, None) => TemplateQuery::ByType(t.clone()),
                (None, _, _, None) => TemplateQuery::All,
            };
            run_templates(&config, query, template_type, content).await?;
        }
        Commands::Config(cmd) => {
            run_config_command(cmd, &cli.config, config_path)?;
        }
    }

    Ok(())
}

/// An explicit path must exist; the default location may be absent
fn load_config(explicit: &Option<PathBuf>) -> Result<Config, ConfigError> {
    match explicit {
        Some(path) if !path.exists() => Err(ConfigError::NotFound(path.clone())),
        Some(path) => Config::load_from(path.clone()),
        None => Config::load(),
    }
}

/// Literal text, a readable file, or `-` for stdin
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer);
    }
    let path = Path::new(input);
    if path.is_file() {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    Ok(input.to_string())
}

fn generate_message_id() -> String {
    format!("msg-{}", chrono::Utc::now().timestamp_millis())
}

fn compile_patterns() -> Result<Arc<Patterns>> {
    Ok(Arc::new(Patterns::compile()?))
}

/// Built-in templates plus the configured catalog
async fn template_store(config: &Config) -> Result<Arc<InMemoryTemplateStore>> {
    let store = InMemoryTemplateStore::seeded(builtin_templates()).await;
    if let Some(path) = &config.templates.catalog_path {
        let templates = load_catalog(path)?;
        store.seed(templates).await;
    }
    Ok(Arc::new(store))
}

fn optimizer(config: &Config, patterns: Arc<Patterns>) -> PromptOptimizer {
    PromptOptimizer::new(
        Arc::new(ContentAnalyzer::new(patterns)),
        OptimizationConfig {
            token_budget: config.optimization.token_budget,
        },
    )
}

fn default_type(config: &Config) -> &str {
    config.optimization.default_template_type.as_str()
}

async fn run_send(config: Config, request: SendRequest) -> Result<()> {
    let renderer = TerminalRenderer::new();
    let metrics = MetricsTracker::new();

    let upstream = UpstreamClient::new(
        config.provider.base_url.clone(),
        config.api_key(),
        Duration::from_secs(config.relay.connect_timeout_secs),
    )?;
    renderer.render_banner(
        env!("CARGO_PKG_VERSION"),
        &config.provider.model,
        &upstream.endpoint(),
    );

    let store = Arc::new(JsonFileMessageStore::new(config.store.messages_dir()));
    let relay = Relay::new(store.clone(), RelayConfig::from(&config.relay)).with_metrics(metrics.clone());
    let mut service = RelayService::new(Arc::new(upstream), relay, config.provider.clone())
        .with_metrics(metrics.clone());

    let mut aggregator = None;
    if config.optimization.enabled {
        let patterns = compile_patterns()?;
        let templates = template_store(&config).await?;
        let (stats, stats_task) = StatsAggregator::channel(templates.clone());
        let selector = TemplateSelector::new(
            templates,
            patterns.clone(),
            Arc::new(KeywordTypeTable::builtin()),
        )
        .with_stats(stats);
        let pipeline =
            PromptPipeline::new(selector, optimizer(&config, patterns), default_type(&config));
        service = service.with_pipeline(pipeline);
        aggregator = Some(stats_task.spawn());
    }

    let handle = service.send_message(request);
    let report = tui::stream_to_terminal(handle, &renderer).await?;

    // Dropping the service closes the stats channel
    drop(service);
    if let Some(task) = aggregator {
        let applied = task.await?;
        debug!(applied, "Template usage updates applied");
    }

    if report.persisted {
        renderer.render_info(&format!(
            "Answer saved as {}",
            store.path_for(&report.message_id).display()
        ));
    }
    println!("{}", metrics.summary());

    if report.state != RelayState::Done {
        bail!("relay ended in state {}", report.state);
    }
    Ok(())
}

async fn run_optimize(
    config: Config,
    content: String,
    template_type: Option<String>,
    variables: HashMap<String, String>,
    output: Option<PathBuf>,
) -> Result<()> {
    info!(
        "Optimizing prompt with a budget of {} tokens",
        config.optimization.token_budget
    );

    let patterns = compile_patterns()?;
    let templates = template_store(&config).await?;
    let selector = TemplateSelector::new(
        templates,
        patterns.clone(),
        Arc::new(KeywordTypeTable::builtin()),
    );
    let optimizer = optimizer(&config, patterns);

    let template_type = template_type
        .or_else(|| selector.infer_type(&content))
        .unwrap_or_else(|| default_type(&config).to_string());
    let template = selector.find_best_template(&template_type, &content).await;
    let report = optimizer.optimize(&content, &template, &variables);
    if let Some(reason) = &report.fallback {
        TerminalRenderer::new().render_error(&format!("Kept the original message: {}", reason));
    }

    if let Some(path) = output {
        tokio::fs::write(&path, &report.prompt).await?;
        println!("Optimized prompt written to: {}", path.display());
    } else {
        println!("{}", report.prompt);
    }

    println!("\n--- Optimization Stats ---");
    TerminalRenderer::new().render_optimization(&report.stats);

    Ok(())
}

fn run_analyze(content: &str, json: bool) -> Result<()> {
    let analyzer = ContentAnalyzer::new(compile_patterns()?);
    let structure = analyzer.analyze_structure(content);

    if json {
        println!("{}", serde_json::to_string_pretty(&structure)?);
    } else {
        TerminalRenderer::new().render_structure(&structure);
    }
    Ok(())
}

fn run_estimate(
    config: &Config,
    content: &str,
    fit: Option<usize>,
    strategy: Option<StrategyKind>,
    auto: bool,
) -> Result<()> {
    let estimator = TokenEstimator::new();
    let renderer = TerminalRenderer::new();
    let tokens = estimator.estimate(content);
    renderer.render_info(&format!("~{} tokens", tokens));

    let Some(budget) = fit else {
        return Ok(());
    };

    let optimizer = optimizer(config, compile_patterns()?);
    let fitted = match strategy {
        Some(kind) => optimizer.compress_with(kind, content, budget)?,
        None if auto => optimizer.compress(content, budget),
        None => optimizer.compress_context(content, budget),
    };
    println!("{}", fitted);
    renderer.render_info(&format!(
        "~{} -> ~{} tokens (budget {})",
        tokens,
        estimator.estimate(&fitted),
        budget
    ));
    Ok(())
}

async fn run_templates(
    config: &Config,
    query: TemplateQuery,
    template_type: Option<String>,
    content: Option<String>,
) -> Result<()> {
    let patterns = compile_patterns()?;
    let templates = template_store(config).await?;
    let mut listed = query.run(&*templates).await?;
    if let (TemplateQuery::EstimatedTokens { .. }, Some(t)) = (&query, &template_type) {
        listed.retain(|template| &template.template_type == t);
    }
    let renderer = TerminalRenderer::new();

    let Some(content) = content else {
        let rows: Vec<_> = listed.into_iter().map(|t| (t, None)).collect();
        renderer.render_templates(&rows);
        return Ok(());
    };

    let selector = TemplateSelector::new(
        templates.clone(),
        patterns,
        Arc::new(KeywordTypeTable::builtin()),
    );
    let mut rows: Vec<_> = listed
        .into_iter()
        .map(|t| {
            let breakdown = selector.scorer().breakdown(&t, &content);
            (t, Some(breakdown))
        })
        .collect();
    rows.sort_by(|a, b| total(b).total_cmp(&total(a)));
    renderer.render_templates(&rows);

    let inferred = template_type
        .or_else(|| selector.infer_type(&content))
        .unwrap_or_else(|| default_type(config).to_string());
    let best = selector.find_best_template(&inferred, &content).await;
    renderer.render_success(&format!(
        "Selected {} (type {}) for type {}",
        best.name, best.template_type, inferred
    ));
    Ok(())
}

fn total(row: &(PromptTemplate, Option<ScoreBreakdown>)) -> f64 {
    row.1.as_ref().map(|b| b.total).unwrap_or_default()
}

fn run_config_command(
    cmd: ConfigCommands,
    explicit: &Option<PathBuf>,
    path: PathBuf,
) -> Result<()> {
    let renderer = TerminalRenderer::new();
    match cmd {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                renderer.render_system(&format!(
                    "Configuration file already exists at: {}",
                    path.display()
                ));
                renderer.render_info("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save_to(path.clone())?;

            renderer.render_success(&format!("Configuration file created at: {}", path.display()));
            println!();
            println!("Next steps:");
            println!("  1. Edit the config file to add your API key, or");
            println!("  2. Set environment variables:");
            println!("     export {}=your_key", API_KEY_ENV);
            println!("     export {}=https://api.example.com/v1", BASE_URL_ENV);
        }
        ConfigCommands::Show { section } => {
            let mut config = load_config(explicit)?;
            if config.provider.api_key.is_some() {
                config.provider.api_key = Some("***".to_string());
            }

            let display = match section.as_deref().map(str::to_lowercase).as_deref() {
                None => toml::to_string_pretty(&config)?,
                Some("provider") => toml::to_string_pretty(&config.provider)?,
                Some("relay") => toml::to_string_pretty(&config.relay)?,
                Some("optimization") => toml::to_string_pretty(&config.optimization)?,
                Some("templates") => toml::to_string_pretty(&config.templates)?,
                Some("store") => toml::to_string_pretty(&config.store)?,
                Some(other) => {
                    renderer.render_error(&format!("Unknown section: {}", other));
                    renderer.render_info("Available: provider, relay, optimization, templates, store");
                    return Ok(());
                }
            };
            println!("{}", display);

            println!("\n--- Environment Variables ---");
            for name in [API_KEY_ENV, BASE_URL_ENV, MODEL_ENV] {
                let status = if std::env::var(name).is_ok() { "set" } else { "not set" };
                println!("{}: {}", name, status);
            }
        }
        ConfigCommands::Path => {
            println!("{}", path.display());
        }
        ConfigCommands::Validate => {
            let config = load_config(explicit)?;
            config.validate()?;
            renderer.render_success("Configuration is valid");
            renderer.render_info(&format!(
                "{} at {}",
                config.provider.model, config.provider.base_url
            ));
        }
    }
    Ok(())
}
