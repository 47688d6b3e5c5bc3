//! Client configuration: endpoint, credentials, model, pricing, pacing.
//!
//! Loaded once, validated once, then immutable for the client's lifetime.
//! [`ClientConfig::from_env`] covers the common deployment shape; everything
//! is also settable through the builder methods for embedding applications
//! that manage their own configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use tracing::debug;

use crate::cost::PriceSchedule;
use crate::error::Error;
use crate::retry::RetryConfig;

/// Default Perplexity chat-completions endpoint.
pub const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";

/// Per-request timeout applied to the HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Perplexity model names.
pub mod models {
    pub const SONAR: &str = "sonar";
    pub const SONAR_PRO: &str = "sonar-pro";
    pub const SONAR_REASONING: &str = "sonar-reasoning";
}

// Environment variable names, matching the PPLX_* convention used elsewhere
// in the ecosystem.
const ENV_API_KEY: &str = "PPLX_API_KEY";
const ENV_API_BASE: &str = "PPLX_API_BASE";
const ENV_MODEL: &str = "PPLX_MODEL";
const ENV_INPUT_PRICE: &str = "PPLX_INPUT_PRICE_PPM";
const ENV_OUTPUT_PRICE: &str = "PPLX_OUTPUT_PRICE_PPM";
const ENV_SEARCH_PRICE: &str = "PPLX_SEARCH_PRICE_PPK";

/// Everything [`PerplexityClient`](crate::PerplexityClient) needs to operate.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer token for the `Authorization` header.
    pub api_key: String,
    /// Full URL of the chat-completions endpoint.
    pub api_url: String,
    /// Model identifier sent in every request.
    pub model: String,
    /// Price schedule for cost estimation.
    pub pricing: PriceSchedule,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry budget and pacing.
    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Create a config with the given API key and defaults for everything
    /// else: the public endpoint, the `sonar` model, its published pricing,
    /// a 60 s timeout, and 3 retries at 1 s apart.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: PERPLEXITY_API_URL.to_string(),
            model: models::SONAR.to_string(),
            // Published sonar pricing: $1/M input, $1/M output, $5/K searches.
            pricing: PriceSchedule {
                input_per_million: Decimal::ONE,
                output_per_million: Decimal::ONE,
                search_per_thousand: Decimal::from(5),
            },
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    /// Load configuration from `PPLX_*` environment variables.
    ///
    /// `PPLX_API_KEY` is required; `PPLX_API_BASE`, `PPLX_MODEL`,
    /// `PPLX_INPUT_PRICE_PPM`, `PPLX_OUTPUT_PRICE_PPM`, and
    /// `PPLX_SEARCH_PRICE_PPK` override the defaults when set.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| Error::Config(format!("{ENV_API_KEY} not set")))?;

        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var(ENV_API_BASE) {
            config.api_url = url;
        }
        if let Ok(model) = std::env::var(ENV_MODEL) {
            config.model = model;
        }
        if let Ok(raw) = std::env::var(ENV_INPUT_PRICE) {
            config.pricing.input_per_million = parse_price(ENV_INPUT_PRICE, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_OUTPUT_PRICE) {
            config.pricing.output_per_million = parse_price(ENV_OUTPUT_PRICE, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_SEARCH_PRICE) {
            config.pricing.search_per_thousand = parse_price(ENV_SEARCH_PRICE, &raw)?;
        }

        config.validate()?;
        debug!(
            "Loaded Perplexity config from environment: url={}, model={}",
            config.api_url, config.model,
        );
        Ok(config)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the endpoint URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the price schedule.
    pub fn with_pricing(mut self, pricing: PriceSchedule) -> Self {
        self.pricing = pricing;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget and pacing.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Reject configurations the client must not run with.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key is empty".into()));
        }
        if self.api_url.trim().is_empty() {
            return Err(Error::Config("API URL is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model name is empty".into()));
        }
        for (name, price) in [
            ("input price", self.pricing.input_per_million),
            ("output price", self.pricing.output_per_million),
            ("search price", self.pricing.search_per_thousand),
        ] {
            if price < Decimal::ZERO {
                return Err(Error::Config(format!("{name} is negative: {price}")));
            }
        }
        Ok(())
    }
}

fn parse_price(name: &str, raw: &str) -> Result<Decimal, Error> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| Error::Config(format!("{name}={raw:?} is not a valid price: {e}")))
}
