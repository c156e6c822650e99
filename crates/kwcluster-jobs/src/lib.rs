//! # kwcluster-jobs
//!
//! Job execution for the keyword research pipeline.
//!
//! This crate provides:
//! - [`SimilarityClassifier`]: result-overlap deduplication into primary and
//!   auxiliary keywords
//! - [`PipelineOrchestrator`]: parse, fetch, classify, enrich, with job state
//!   transitions and notifications
//! - [`JobWorker`]: claims pending jobs, enforces a time limit, reaps stale runs
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kwcluster_jobs::{JobWorker, PipelineOrchestrator, WorkerConfig};
//!
//! let pipeline = PipelineOrchestrator::new(jobs, keywords, scheduler, notifier)
//!     .with_intent_classifier(classifier);
//! let handle = JobWorker::new(Arc::new(pipeline), WorkerConfig::from_env()).start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! handle.shutdown().await?;
//! ```

pub mod classifier;
pub mod pipeline;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use classifier::{ClassificationSummary, SimilarityClassifier};
pub use pipeline::{PipelineConfig, PipelineOrchestrator, PipelineReport, DUPLICATE_TASK_MESSAGE};
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle, ABANDONED_MESSAGE};
