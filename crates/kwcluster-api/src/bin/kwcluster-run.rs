//! kwcluster-run: run the keyword research pipeline on one file, locally.
//!
//! Uses the in-memory store, so no database is needed. SERP access still
//! needs `SERPER_API_KEY`; the rate limiter follows `RATE_LIMIT_BACKEND`
//! unless `--local-limiter` is given.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use kwcluster_api::telemetry;
use kwcluster_core::{
    export_csv, CreateJobRequest, EventBus, JobRepository, KeywordRepository, SearchLocale,
};
use kwcluster_db::MemoryStore;
use kwcluster_jobs::{PipelineConfig, PipelineOrchestrator};
use kwcluster_serp::{
    build_rate_limiter, BatchScheduler, FetchPolicy, RateLimitBackend, RateLimiterConfig,
    SchedulerConfig, SerpFetcher, SerperProvider,
};

#[derive(Parser)]
#[command(name = "kwcluster-run")]
#[command(author, version, about = "Cluster a keyword file by shared search results")]
struct Cli {
    /// Keyword CSV: header row, then keyword, search_volume[, word_count]
    input: PathBuf,

    /// Where to write the export (default: <input>_clustered.csv)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Job description; its first words name the run
    #[arg(short, long)]
    description: Option<String>,

    /// Label primary keywords with search intent (needs AI_ENABLED and OPENAI_* settings)
    #[arg(long)]
    ai: bool,

    /// Keep the rate-limit window in this process instead of Redis
    #[arg(long)]
    local_limiter: bool,

    /// Override SERP_MAX_QPS
    #[arg(long)]
    max_qps: Option<u32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = telemetry::init_tracing("kwcluster=info");
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut limiter_config = RateLimiterConfig::from_env();
    if cli.local_limiter {
        limiter_config = limiter_config.with_backend(RateLimitBackend::Memory);
    }
    if let Some(qps) = cli.max_qps {
        limiter_config = limiter_config.with_max_qps(qps);
    }
    let limiter = build_rate_limiter(limiter_config).await?;

    let fetcher = SerpFetcher::new(
        Arc::new(SerperProvider::from_env()?),
        limiter,
        SearchLocale::from_env(),
        FetchPolicy::from_env(),
    );
    let scheduler = BatchScheduler::new(fetcher, SchedulerConfig::from_env());

    let store = Arc::new(MemoryStore::new());
    let classifier = if cli.ai {
        let classifier = kwcluster_inference::classifier_from_env()?;
        if classifier.is_none() {
            anyhow::bail!("--ai needs AI_ENABLED=true and an OpenAI-compatible endpoint");
        }
        classifier
    } else {
        None
    };
    let pipeline = PipelineOrchestrator::new(
        store.clone(),
        store.clone(),
        scheduler,
        Arc::new(EventBus::default()),
    )
    .with_intent_classifier(classifier)
    .with_config(PipelineConfig::from_env());

    let file_name = cli
        .input
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("keywords.csv")
        .to_string();
    let job = store
        .create(CreateJobRequest::new(
            "local",
            &file_name,
            cli.description,
            cli.input.to_string_lossy(),
            cli.ai,
        ))
        .await?;

    let report = pipeline.start(job.id).await?;
    let primaries = store.list_primary_for_job(job.id).await?;
    let output = cli.output.unwrap_or_else(|| default_output(&cli.input));
    tokio::fs::write(&output, export_csv(&primaries)?).await?;

    let finished = store.get(job.id).await?.unwrap_or(job);
    info!(
        output = %output.display(),
        keyword_count = report.keyword_count,
        fetched = report.fetched,
        primary_count = report.primary_count,
        auxiliary_count = report.auxiliary_count,
        duration = %finished.duration(),
        "Run finished"
    );
    println!(
        "{}: {} keywords, {} fetched, {} primary, {} merged -> {}",
        finished.name,
        report.keyword_count,
        report.fetched,
        report.primary_count,
        report.auxiliary_count,
        output.display()
    );
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("keywords");
    input.with_file_name(format!("{}_clustered.csv", stem))
}
