//! Serper.dev search provider.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `SERPER_API_KEY`: API key sent as `X-API-KEY` (required)
//! - `SERPER_BASE_URL`: endpoint root (default: https://google.serper.dev)
//! - `SERP_TIMEOUT_SECS`: per-request timeout (default: 30)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use kwcluster_core::{defaults, Error, Result, SearchLocale, SerpError, SerpHit, SerpProvider};

/// Serper client configuration.
#[derive(Debug, Clone)]
pub struct SerperConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl SerperConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: defaults::SERPER_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout_seconds: defaults::SERP_TIMEOUT_SECS,
        }
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("SERPER_API_KEY")
            .map_err(|_| Error::Config("SERPER_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("SERPER_BASE_URL") {
            config.base_url = url;
        }
        if let Some(secs) = std::env::var("SERP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout_seconds = secs;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    gl: &'a str,
    hl: &'a str,
    num: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

/// HTTP client for the Serper search API.
pub struct SerperProvider {
    client: Client,
    config: SerperConfig,
}

impl SerperProvider {
    pub fn new(config: SerperConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SerperConfig::from_env()?)
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SerpProvider for SerperProvider {
    async fn search(
        &self,
        query: &str,
        locale: &SearchLocale,
    ) -> std::result::Result<Vec<SerpHit>, SerpError> {
        let body = SearchRequest {
            q: query,
            gl: &locale.gl,
            hl: &locale.hl,
            num: locale.num,
            location: locale.location.as_deref(),
        };

        trace!(
            subsystem = "serp",
            component = "serper",
            op = "search",
            keyword = query,
            "Sending search request"
        );

        let response = self
            .client
            .post(self.search_url())
            .header("X-API-KEY", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SerpError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SerpError::RateLimited);
        }
        if !status.is_success() {
            return Err(SerpError::Status(status.as_u16()));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SerpError::Decode(e.to_string()))?;

        let hits: Vec<SerpHit> = parsed
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(locale.num)
            .map(|r| SerpHit {
                url: r.link,
                title: r.title,
            })
            .collect();

        debug!(
            subsystem = "serp",
            component = "serper",
            op = "search",
            keyword = query,
            result_count = hits.len(),
            "Search completed"
        );
        Ok(hits)
    }
}
