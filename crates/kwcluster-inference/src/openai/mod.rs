//! OpenAI-compatible chat backend for intent classification.
//!
//! Works with any server exposing `/chat/completions` (OpenAI, OpenRouter,
//! vLLM, llama.cpp, Ollama's compatibility layer).

mod backend;
mod error;
mod types;

pub use backend::{OpenAIConfig, OpenAIIntentClassifier, DEFAULT_GEN_MODEL, DEFAULT_OPENAI_URL};
pub use error::{to_core_error, OpenAIErrorCode};
