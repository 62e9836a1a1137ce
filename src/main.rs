//! Research Agency CLI
//!
//! - `eval`: run an evaluation suite and print the run directory
//! - `reduce`: reduce a JSON list of documents to adjudicated claim groups

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use research_agency::config::AppConfig;
use research_agency::evals::{load_suite, EvalOptions, EvalRunner};
use research_agency::evidence::{EvidenceReducer, EvidenceStore, RunRecord, SqliteEvidenceStore, ThinkingExtent};
use research_agency::llm::{ConfigRouter, ModelRouter};
use research_agency::logging::{init_logging, log_level};
use research_agency::trace::{JsonlTraceSink, NullTraceSink, TraceSink};
use research_agency::types::Document;

const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "research-agency")]
#[command(author, version, about = "Evidence reduction and statistical stage evaluation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config YAML (default: ./config.yaml when present)
    #[arg(long, global = true, env = "RESEARCH_AGENCY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true)]
    debug: bool,

    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evaluation suite
    Eval {
        /// Suite definition (YAML or JSON)
        #[arg(long)]
        suite: PathBuf,

        /// Trials per case, overriding case and suite settings
        #[arg(long)]
        trials: Option<u32>,

        /// Model name override
        #[arg(long)]
        model: Option<String>,

        /// Single temperature, overriding case and suite settings
        #[arg(long)]
        temperature: Option<f64>,

        /// Output root (default: evals.output_dir from config)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Enable model-graded validators
        #[arg(long)]
        llm_judge: bool,
    },

    /// Reduce documents to adjudicated claim groups
    Reduce {
        /// JSON file holding a list of documents
        #[arg(long)]
        docs: PathBuf,

        /// Thinking extent (low, medium, high, heavy)
        #[arg(long)]
        extent: Option<String>,

        /// Model name override
        #[arg(long)]
        model: Option<String>,

        /// Persist the reduction to SQLite (storage.sqlite_path unless --db is given)
        #[arg(long)]
        persist: bool,

        /// SQLite file to persist into; implies --persist
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write trace.jsonl into this directory (default with --persist: storage.runs_dir/<run id>)
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(AppConfig::load(DEFAULT_CONFIG)?),
        None => {
            let mut config = AppConfig::default();
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let level = log_level(cli.verbose, cli.debug, cli.quiet);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Eval {
            suite,
            trials,
            model,
            temperature,
            out,
            llm_judge,
        } => {
            let mut options = EvalOptions::from_config(&config)
                .with_trials(trials)
                .with_model(model)
                .with_temperature(temperature)
                .with_llm_judge(llm_judge || config.evals.llm_judge);
            if let Some(out) = out {
                options = options.with_output_dir(out);
            }

            let router = ConfigRouter::new(config.model.clone());
            let runner = EvalRunner::new(&router, options);
            let loaded = load_suite(&suite).with_context(|| format!("loading suite {}", suite.display()))?;
            let fixtures_dir = loaded.resolve_fixtures_dir(&suite);
            let run_dir = runner.run_dir_for(&loaded);

            let _guard = init_logging(level, Some(&run_dir))?;
            runner.run_in(&loaded, &fixtures_dir, &run_dir).await?;
            println!("{}", run_dir.display());
        }
        Commands::Reduce {
            docs,
            extent,
            model,
            persist,
            db,
            trace_dir,
        } => {
            let _guard = init_logging(level, None)?;
            let raw = std::fs::read_to_string(&docs).with_context(|| format!("reading {}", docs.display()))?;
            let documents: Vec<Document> = serde_json::from_str(&raw).context("documents must be a JSON list")?;

            let extent_label = extent.unwrap_or_else(|| config.thinking_extent.clone());
            let routed = ConfigRouter::new(config.model.clone()).route(&extent_label, model.as_deref())?;
            let mut run = RunRecord {
                id: uuid::Uuid::new_v4().to_string(),
                question: docs.display().to_string(),
                created_at: Utc::now(),
                mode: "reduce".to_string(),
                thinking_extent: extent_label.clone(),
                status: "running".to_string(),
            };

            let db = db.or_else(|| persist.then(|| config.storage.sqlite_path.clone()));
            let trace_dir = trace_dir.or_else(|| db.as_ref().map(|_| config.storage.runs_dir.join(&run.id)));
            let jsonl = trace_dir.map(JsonlTraceSink::create).transpose()?;
            let trace: &dyn TraceSink = match &jsonl {
                Some(sink) => sink,
                None => &NullTraceSink,
            };

            let store = match &db {
                Some(path) => Some(SqliteEvidenceStore::open(path).await?),
                None => None,
            };
            if let Some(store) = &store {
                store.record_run(&run).await?;
            }

            let result = EvidenceReducer::new(routed.provider.as_ref(), ThinkingExtent::from_label(&extent_label))
                .with_trace(trace)
                .reduce(&documents)
                .await?;

            if let Some(store) = &store {
                store.persist_reduction(&documents, &result).await?;
                run.status = "completed".to_string();
                store.record_run(&run).await?;
                info!("💾 Run {} stored in {}", run.id, store.path().display());
            }
            println!("{}", serde_json::to_string_pretty(&result.claim_groups)?);
        }
    }

    Ok(())
}
