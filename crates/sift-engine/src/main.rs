//! Sift Engine CLI
//!
//! Evaluates articles against stream definitions, backfills a stream over a
//! corpus, inspects plugin state, and checks search query syntax.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use sift_engine::{
    backfill_stream, load_articles, load_stream_definitions, ConfigOverrides, EngineConfig,
    EngineContext, InMemoryMatchStore, LogFormat,
};
use sift_plugins::BackendRegistry;
use sift_rules::{
    compile_active_streams, parse_query, requires_advanced_search, CompiledStream, StreamDefinition,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sift-engine")]
#[command(about = "Sift stream matching engine", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Plugin registry file, overrides the configuration
    #[arg(long, env = "SIFT_PLUGIN_REGISTRY")]
    plugin_registry: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the Prometheus exposition after the command
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a search query and print its tree
    CheckQuery {
        query: String,
    },

    /// Print plugin status snapshots as JSON
    Plugins {
        /// Print plugin telemetry in Prometheus text format instead
        #[arg(long)]
        prometheus: bool,
    },

    /// Evaluate articles against every active stream
    Evaluate {
        /// Stream definitions (YAML)
        #[arg(long)]
        streams: PathBuf,

        /// Articles (JSON lines)
        #[arg(long)]
        articles: PathBuf,

        /// Evaluate articles as given, without ingest hooks
        #[arg(long)]
        skip_ingest_hooks: bool,
    },

    /// Re-evaluate one stream against a corpus and replace its matches
    Backfill {
        /// Stream definitions (YAML)
        #[arg(long)]
        streams: PathBuf,

        /// Articles (JSON lines)
        #[arg(long)]
        articles: PathBuf,

        #[arg(long)]
        stream_id: String,

        /// Maximum article evaluations in flight
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        plugin_registry_path: cli.plugin_registry.clone(),
        backfill_concurrency: match &cli.command {
            Command::Backfill { concurrency, .. } => *concurrency,
            _ => None,
        },
        log_format: cli.log_format,
    };
    let config = EngineConfig::load(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;

    init_tracing(cli.verbose, config.logging.format);
    let metrics_handle = init_metrics()?;

    match &cli.command {
        Command::CheckQuery { query } => check_query(query)?,
        Command::Plugins { prometheus } => {
            let context = build_context(config)?;
            if *prometheus {
                print!("{}", context.telemetry().render_prometheus());
            } else {
                println!("{}", serde_json::to_string_pretty(&context.plugin_statuses())?);
            }
        }
        Command::Evaluate {
            streams,
            articles,
            skip_ingest_hooks,
        } => {
            let context = build_context(config)?;
            let definitions = load_stream_definitions(streams)?;
            let compiled = compile_active_streams(&definitions);
            let articles = load_articles(articles)?;
            info!("Evaluating {} articles against {} streams", articles.len(), compiled.len());

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for article in articles {
                let outcome = if *skip_ingest_hooks {
                    context.evaluate_article(&article, &compiled).await
                } else {
                    context.process_article(article, &compiled).await
                };
                writeln!(out, "{}", serde_json::to_string(&outcome)?)?;
            }
        }
        Command::Backfill {
            streams,
            articles,
            stream_id,
            ..
        } => {
            let context = build_context(config)?;
            let stream = find_stream(&load_stream_definitions(streams)?, stream_id)?;
            let articles = load_articles(articles)?;

            let store = InMemoryMatchStore::new();
            let report = backfill_stream(&context, &stream, articles, &store).await?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            writeln!(out, "{}", serde_json::to_string(&report)?)?;
            for decision in store.matches_for(stream_id) {
                writeln!(out, "{}", serde_json::to_string(&decision)?)?;
            }
        }
    }

    if cli.metrics {
        print!("{}", metrics_handle.render());
    }

    Ok(())
}

fn build_context(config: EngineConfig) -> Result<EngineContext> {
    let backends = BackendRegistry::with_builtins();
    let context = EngineContext::from_config(config, &backends).context("Failed to load plugins")?;
    info!("Active plugins: {:?}", context.plugins().names());
    Ok(context)
}

fn check_query(query: &str) -> Result<()> {
    match parse_query(query) {
        Ok(parsed) => {
            println!("{}", parsed.expression());
            println!("advanced: {}", requires_advanced_search(query));
            Ok(())
        }
        Err(e) => match e.index {
            Some(index) => anyhow::bail!("syntax error at index {}: {}", index, e.message),
            None => anyhow::bail!("syntax error: {}", e.message),
        },
    }
}

fn find_stream(definitions: &[StreamDefinition], stream_id: &str) -> Result<CompiledStream> {
    let definition = definitions
        .iter()
        .find(|definition| definition.id == stream_id)
        .with_context(|| format!("Stream '{}' not found", stream_id))?;
    definition
        .compile()
        .with_context(|| format!("Stream '{}' is invalid", stream_id))
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("sift=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sift=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    sift_engine::describe_metrics();
    Ok(handle)
}
