//! # kwcluster-inference
//!
//! Keyword intent classification for kwcluster.
//!
//! - [`openai::OpenAIIntentClassifier`]: any OpenAI-compatible chat endpoint
//! - [`prompt`]: system instruction, user prompt, reply parsing
//! - `mock` (feature `mock`): deterministic classifier for tests

use std::sync::Arc;

use tracing::info;

use kwcluster_core::{IntentClassifier, Result};

pub mod openai;
pub mod prompt;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use openai::{OpenAIConfig, OpenAIIntentClassifier};
pub use prompt::{build_prompt, parse_labels, SYSTEM_INSTRUCTION};

/// Whether AI enrichment is switched on (`AI_ENABLED`, default off).
pub fn ai_enabled_from_env() -> bool {
    std::env::var("AI_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the configured classifier, or `None` when AI enrichment is disabled.
pub fn classifier_from_env() -> Result<Option<Arc<dyn IntentClassifier>>> {
    if !ai_enabled_from_env() {
        info!(
            subsystem = "inference",
            "AI enrichment disabled (AI_ENABLED not set)"
        );
        return Ok(None);
    }
    let classifier = OpenAIIntentClassifier::from_env()?;
    Ok(Some(Arc::new(classifier)))
}
