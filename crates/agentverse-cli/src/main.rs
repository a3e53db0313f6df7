//! AgentVerse memory CLI
//!
//! The `agentverse-memory` command runs memory manipulators over a JSON
//! memory file and prints the resulting prompt context.
//!
//! ## Commands
//!
//! - `run`: Execute a TOML-configured pipeline for one or more turns
//! - `filter`: Filter memories by topic, pattern, length and relevance
//! - `transform`: Render memories in a target format
//! - `list`: Show the registered manipulator keys
//!
//! LLM and embedding calls go to an OpenAI-compatible endpoint configured
//! through `AGENTVERSE_API_BASE`, `AGENTVERSE_API_KEY`,
//! `AGENTVERSE_CHAT_MODEL` and `AGENTVERSE_EMBEDDING_MODEL`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentverse_memory::{
    init_tracing, level_for, FilterCriteria, FilterManipulator, FormatKind, ManipulationResult,
    Manipulator, ManipulatorPipeline, ManipulatorRegistry, PipelineConfig, PipelineReport,
    Services, TransformConfig, TransformManipulator,
};
use agentverse_state::{JsonFileStore, OpenAiClient};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "agentverse-memory")]
#[command(author = "AgentVerse Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn agent memory into bounded prompt context", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Do not attach the HTTP LLM/embedding client
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a configured manipulator pipeline
    Run {
        /// Pipeline definition (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Memory file (JSON array of records)
        #[arg(short, long)]
        memories: PathBuf,

        /// Current turn context
        #[arg(long)]
        context: Option<String>,

        /// Number of turns to run
        #[arg(long, default_value_t = 1)]
        turns: usize,

        /// Print the full report as JSON instead of the context
        #[arg(long)]
        report: bool,
    },

    /// Filter memories
    Filter {
        /// Memory file (JSON array of records)
        #[arg(short, long)]
        memories: PathBuf,

        /// Keep memories mentioning any of these topics
        #[arg(short, long)]
        topic: Vec<String>,

        /// Keep memories matching this regex (repeatable)
        #[arg(long)]
        include: Vec<String>,

        /// Drop memories matching this regex (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Minimum similarity to the context
        #[arg(long, default_value_t = 0.0)]
        relevance: f64,

        /// Only keep memories newer than this many seconds
        #[arg(long)]
        recent: Option<u64>,

        /// Context used for relevance scoring
        #[arg(long)]
        context: Option<String>,
    },

    /// Render memories in a target format
    Transform {
        /// Memory file (JSON array of records)
        #[arg(short, long)]
        memories: PathBuf,

        /// structured, summary, highlights, qa or custom
        #[arg(short, long, default_value = "structured")]
        format: FormatKind,

        /// Template for the custom format
        #[arg(long)]
        template: Option<String>,

        /// Omit timestamps
        #[arg(long)]
        no_timestamps: bool,

        #[arg(long)]
        context: Option<String>,
    },

    /// List registered manipulators
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.json, level_for(cli.verbose));

    match cli.command {
        Commands::Run {
            config,
            memories,
            context,
            turns,
            report,
        } => {
            let services = build_services(&memories, cli.offline)?;
            let reports = cmd_run(&services, &config, context.as_deref(), turns).await?;
            for r in &reports {
                if report {
                    println!("{}", serde_json::to_string_pretty(r)?);
                } else {
                    println!("{}", r.context());
                }
            }
            if reports.iter().any(|r| !r.success) {
                eprintln!("warning: one or more stages degraded");
            }
            Ok(())
        }
        Commands::Filter {
            memories,
            topic,
            include,
            exclude,
            relevance,
            recent,
            context,
        } => {
            let mut criteria = FilterCriteria::default()
                .with_topics(topic)
                .with_relevance(relevance);
            if let Some(secs) = recent {
                criteria = criteria.with_recency_window(secs);
            }
            for pattern in &include {
                criteria = criteria.include_pattern(pattern);
            }
            for pattern in &exclude {
                criteria = criteria.exclude_pattern(pattern);
            }
            let services = build_services(&memories, cli.offline)?;
            let result = cmd_filter(&services, criteria, context.as_deref()).await?;
            print_result(&result)
        }
        Commands::Transform {
            memories,
            format,
            template,
            no_timestamps,
            context,
        } => {
            let mut config = TransformConfig::default().with_kind(format);
            if let Some(ref t) = template {
                config = config.with_template(t);
            }
            config.include_timestamps = !no_timestamps;
            let services = build_services(&memories, cli.offline)?;
            let result = cmd_transform(&services, config, context.as_deref()).await?;
            print_result(&result)
        }
        Commands::List => {
            for kind in ManipulatorRegistry::with_builtins().kinds() {
                println!("{kind}");
            }
            Ok(())
        }
    }
}

/// Wire the memory file and, unless offline, the HTTP client.
fn build_services(memories: &Path, offline: bool) -> Result<Services> {
    let services = Services::new(Arc::new(JsonFileStore::new(memories)));
    if offline {
        return Ok(services);
    }
    let client = Arc::new(OpenAiClient::from_env().context("Failed to build HTTP client")?);
    Ok(services
        .with_llm(client.clone())
        .with_embeddings(client))
}

fn print_result(result: &ManipulationResult) -> Result<()> {
    println!("{}", result.content);
    info!(metadata = %serde_json::to_string(&result.metadata)?, "Manipulation complete");
    Ok(())
}

async fn cmd_run(
    services: &Services,
    config_path: &Path,
    context: Option<&str>,
    turns: usize,
) -> Result<Vec<PipelineReport>> {
    let config = PipelineConfig::load(config_path)
        .with_context(|| format!("Failed to load pipeline {:?}", config_path))?;
    let registry = ManipulatorRegistry::with_builtins();
    let mut pipeline = ManipulatorPipeline::from_config(&config, &registry, services)
        .context("Failed to assemble pipeline")?;

    let mut reports = Vec::with_capacity(turns);
    for turn in 1..=turns {
        let report = pipeline
            .run(context)
            .await
            .with_context(|| format!("Pipeline aborted on turn {turn}"))?;
        info!(
            turn = turn,
            passed = report.passed_count(),
            stages = report.outcomes.len(),
            "Turn complete"
        );
        reports.push(report);
    }
    Ok(reports)
}

async fn cmd_filter(
    services: &Services,
    criteria: FilterCriteria,
    context: Option<&str>,
) -> Result<ManipulationResult> {
    let embeddings = if criteria.relevance > 0.0 {
        Some(services.require_embeddings("filter")?)
    } else {
        None
    };
    let mut filter = FilterManipulator::new(criteria, services.store.clone(), embeddings)?;
    Ok(filter.manipulate(context).await?)
}

async fn cmd_transform(
    services: &Services,
    config: TransformConfig,
    context: Option<&str>,
) -> Result<ManipulationResult> {
    let llm = if config.format.kind.needs_llm() {
        Some(services.require_llm("transform")?)
    } else {
        None
    };
    let mut transform = TransformManipulator::new(config, services.store.clone(), llm)?;
    Ok(transform.manipulate(context).await?)
}
