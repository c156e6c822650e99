//! kwcluster-api - HTTP API server and background worker for kwcluster

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use kwcluster_api::{router, telemetry, AppState};
use kwcluster_core::{defaults, EventBus, SearchLocale};
use kwcluster_db::{Database, PoolConfig};
use kwcluster_jobs::{JobWorker, PipelineConfig, PipelineOrchestrator, WorkerConfig};
use kwcluster_serp::{
    build_rate_limiter, BatchScheduler, FetchPolicy, RateLimiterConfig, SchedulerConfig,
    SerpFetcher, SerperProvider,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = telemetry::init_tracing("kwcluster=info,tower_http=info");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    info!("Database ready");

    let limiter = build_rate_limiter(RateLimiterConfig::from_env()).await?;
    let provider = Arc::new(SerperProvider::from_env()?);
    let fetcher = SerpFetcher::new(
        provider,
        limiter.clone(),
        SearchLocale::from_env(),
        FetchPolicy::from_env(),
    );
    let scheduler = BatchScheduler::new(fetcher, SchedulerConfig::from_env());

    let jobs = Arc::new(db.jobs.clone());
    let keywords = Arc::new(db.keywords.clone());
    let event_bus = EventBus::default();

    let pipeline = PipelineOrchestrator::new(
        jobs.clone(),
        keywords.clone(),
        scheduler,
        Arc::new(event_bus.clone()),
    )
    .with_intent_classifier(kwcluster_inference::classifier_from_env()?)
    .with_config(PipelineConfig::from_env());

    let worker = JobWorker::new(Arc::new(pipeline), WorkerConfig::from_env()).start();

    let state =
        AppState::new(jobs, keywords, limiter, event_bus).with_upload_dir_from_env();
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    if let Err(e) = worker.shutdown().await {
        warn!(error = %e, "Worker was not running at shutdown");
    }
    Ok(())
}
