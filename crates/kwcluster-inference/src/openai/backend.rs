//! Chat completions client implementing [`IntentClassifier`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info, warn};

use kwcluster_core::{defaults, Error, IntentClassifier, IntentLabels, Result};

use super::error::{to_core_error, OpenAIErrorCode};
use super::types::*;
use crate::prompt::{build_prompt, parse_labels, SYSTEM_INSTRUCTION};

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = defaults::AI_GEN_MODEL;

const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Configuration for the OpenAI-compatible classifier.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key (optional for local endpoints).
    pub api_key: Option<String>,
    pub gen_model: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Send `response_format: json_object`. Some local servers reject it.
    pub json_mode: bool,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            gen_model: DEFAULT_GEN_MODEL.to_string(),
            timeout_seconds: defaults::AI_TIMEOUT_SECS,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            json_mode: true,
        }
    }
}

impl OpenAIConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_GEN_MODEL`,
    /// `OPENAI_TIMEOUT` and `OPENAI_JSON_MODE`.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(base.base_url),
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            gen_model: std::env::var("OPENAI_GEN_MODEL").unwrap_or(base.gen_model),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.timeout_seconds),
            json_mode: std::env::var("OPENAI_JSON_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(base.json_mode),
            ..base
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.gen_model = model.into();
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Labels keyword intent through an OpenAI-compatible chat endpoint.
pub struct OpenAIIntentClassifier {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIIntentClassifier {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            model = %config.gen_model,
            "Initializing intent classifier"
        );
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a POST request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(url);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        req
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages: vec![ChatMessage::system(SYSTEM_INSTRUCTION), ChatMessage::user(prompt)],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            response_format: self.config.json_mode.then(ResponseFormat::json_object),
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<OpenAIErrorResponse>().await.ok();
            let (message, error_type) = body
                .map(|b| (b.error.message, b.error.error_type))
                .unwrap_or_else(|| (format!("HTTP {}", status), String::new()));
            let code = OpenAIErrorCode::from_response(status.as_u16(), &error_type);
            if code.is_fatal() {
                error!(
                    subsystem = "inference",
                    component = "openai",
                    status = status.as_u16(),
                    error = %message,
                    "Intent classifier is misconfigured"
                );
            }
            return Err(to_core_error(code, &message));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &result.usage {
            debug!(
                subsystem = "inference",
                component = "openai",
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        Ok(result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl IntentClassifier for OpenAIIntentClassifier {
    async fn classify(&self, keyword: &str, links: &[String]) -> Result<IntentLabels> {
        let start = Instant::now();
        let reply = self.complete(build_prompt(keyword, links)).await?;

        let labels = match parse_labels(&reply) {
            Some(labels) => labels,
            None => {
                warn!(
                    subsystem = "inference",
                    component = "openai",
                    op = "classify",
                    keyword,
                    reply_len = reply.len(),
                    "Reply held no JSON object"
                );
                IntentLabels::not_applicable()
            }
        };

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "classify",
            keyword,
            intent = %labels.intent,
            kind = %labels.kind,
            duration_ms = start.elapsed().as_millis() as u64,
            "Keyword classified"
        );
        Ok(labels)
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}
