//! Async client for the Perplexity chat-completions API.
//!
//! `pplx-rs` wraps a single request/response cycle: build a payload from a
//! new question plus caller-supplied conversation history, POST it with
//! bearer auth, retry transient failures on a bounded budget, and parse the
//! response into an answer, its citation URLs, and an estimated USD cost.
//!
//! # Getting started
//!
//! ```ignore
//! use pplx_rs::{ClientConfig, PerplexityClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pplx_rs::Error> {
//!     // Reads PPLX_API_KEY (and optional PPLX_* overrides) from the
//!     // environment.
//!     let client = PerplexityClient::new(ClientConfig::from_env()?)?;
//!
//!     let history = vec![];
//!     let result = client.query("What is Rust?", &history).await?;
//!
//!     println!("{}", result.answer);
//!     for url in &result.citations {
//!         println!("  {url}");
//!     }
//!     println!("est. cost: ${}", result.estimated_cost);
//!     Ok(())
//! }
//! ```
//!
//! # Behavior in one paragraph
//!
//! The client holds no mutable state — configuration is validated once at
//! construction and immutable afterwards, so one client can serve concurrent
//! `query` calls. HTTP 429 and 5xx responses and network-level send failures
//! are retried up to [`RetryConfig::max_retries`] times with a fixed delay;
//! any other non-2xx status fails immediately. A 2xx body that is not valid
//! JSON or lacks `choices[0].message.content` is a parse error and is never
//! retried. Cost estimation is best-effort: a malformed `usage` block logs
//! an error and yields a cost of exactly zero rather than failing the query.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`ClientConfig`], environment loading, model constants |
//! | [`retry`] | [`RetryConfig`], transient-status classification |
//! | [`cost`] | [`PriceSchedule`], [`UsageCounters`], quantized cost math |
//! | [`error`] | The [`Error`] taxonomy |

pub mod config;
pub mod cost;
pub mod error;
pub mod retry;

use std::time::Instant;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

pub use config::{ClientConfig, PERPLEXITY_API_URL, models};
pub use cost::{CostError, PriceSchedule, UsageCounters};
pub use error::Error;
pub use retry::RetryConfig;

// ── Wire types ─────────────────────────────────────────────────────

/// A chat message as sent on the wire. The role is caller-supplied free
/// text (`"user"`, `"assistant"`, `"system"`, ...) and is not validated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Chat completion request body.
#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
///
/// `usage` and `citations` stay loosely typed: a malformed usage block must
/// degrade the cost estimate to zero, not fail the whole parse.
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    #[serde(default)]
    usage: Option<Value>,
    #[serde(default)]
    citations: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

/// Result of a successful [`PerplexityClient::query`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// The assistant's answer text.
    pub answer: String,
    /// Citation URLs, in response order. Empty when the response carried
    /// none; never deduplicated or validated.
    pub citations: Vec<String>,
    /// Estimated USD cost, quantized to 4 decimal places. Exactly zero when
    /// usage counters were missing or malformed.
    pub estimated_cost: Decimal,
}

// ── Message assembly ───────────────────────────────────────────────

/// Build the outgoing message list: the new question first (role `"user"`),
/// followed by every history entry that carries both a string `role` and a
/// string `content`, in original order. Malformed entries are dropped
/// silently — history is caller-owned and filtered leniently, not validated.
pub fn build_messages(question: &str, history: &[Value]) -> Vec<Message> {
    let mut messages = vec![Message::user(question)];
    for entry in history {
        let role = entry.get("role").and_then(Value::as_str);
        let content = entry.get("content").and_then(Value::as_str);
        if let (Some(role), Some(content)) = (role, content) {
            messages.push(Message::new(role, content));
        }
    }
    messages
}

/// Pull citation URLs out of the raw `citations` value. Missing field,
/// non-array value, and non-string entries all degrade to "no citations";
/// this never fails.
fn extract_citations(citations: Option<&Value>) -> Vec<String> {
    citations
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Perplexity chat-completions API.
///
/// Construction validates the configuration and fails rather than returning
/// a half-initialized client. All fields are immutable after construction,
/// so sharing one client across tasks needs no locking.
#[derive(Debug)]
pub struct PerplexityClient {
    client: reqwest::Client,
    headers: HeaderMap,
    config: ClientConfig,
}

impl PerplexityClient {
    /// Create a client from a validated configuration.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        config.validate()?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| Error::Config("API key contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .user_agent(concat!("pplx-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        debug!(
            "Perplexity client initialized: url={}, model={}, retries={}",
            config.api_url, config.model, config.retry.max_retries,
        );
        Ok(Self {
            client,
            headers,
            config,
        })
    }

    /// Create a client from `PPLX_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ClientConfig::from_env()?)
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The headers sent with every request: bearer authorization and the
    /// JSON content type.
    pub fn auth_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Ask one question with optional conversation history.
    ///
    /// History entries are serialized JSON objects; entries without a string
    /// `role` and `content` are dropped (see [`build_messages`]). The
    /// calling task blocks for the duration of the network call plus any
    /// retry delays. See the crate docs for the retry and error policy.
    pub async fn query(&self, question: &str, history: &[Value]) -> Result<QueryResult, Error> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: build_messages(question, history),
        };
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts();

        let mut attempt = 1u32;
        loop {
            debug!(
                "Perplexity request: model={}, messages={}, attempt {attempt}/{max_attempts}",
                body.model,
                body.messages.len(),
            );
            let start = Instant::now();
            let sent = self
                .client
                .post(&self.config.api_url)
                .headers(self.headers.clone())
                .json(&body)
                .send()
                .await;

            let status = match sent {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response.text().await?;
                        debug!(
                            "Perplexity response: HTTP {status} in {:.1}s ({} bytes)",
                            start.elapsed().as_secs_f64(),
                            text.len(),
                        );
                        // Parse failures propagate immediately: a retry
                        // cannot fix a malformed response shape.
                        return self.parse_response(&text);
                    }
                    status
                }
                Err(e) => {
                    // Network-level failure: no status to classify, treated
                    // as transient like the 5xx path.
                    if attempt < max_attempts {
                        warn!(
                            "Perplexity request failed: {e} (attempt {attempt}/{max_attempts}), \
                             retrying in {:?}",
                            retry.delay,
                        );
                        tokio::time::sleep(retry.delay).await;
                        attempt += 1;
                        continue;
                    }
                    error!("Perplexity request failed after {max_attempts} attempts: {e}");
                    return Err(Error::Transport(e));
                }
            };

            if retry::is_transient_status(status) && attempt < max_attempts {
                warn!(
                    "Perplexity API HTTP {status} (attempt {attempt}/{max_attempts}), \
                     retrying in {:?}",
                    retry.delay,
                );
                tokio::time::sleep(retry.delay).await;
                attempt += 1;
                continue;
            }

            error!("Perplexity request failed: HTTP {status} after {attempt} attempt(s)");
            return Err(Error::RequestFailed {
                status,
                attempts: attempt,
            });
        }
    }

    /// Parse a 2xx response body into a [`QueryResult`].
    ///
    /// The answer path `choices[0].message.content` is mandatory; citations
    /// and usage are best-effort.
    fn parse_response(&self, body: &str) -> Result<QueryResult, Error> {
        let parsed: RawChatResponse = serde_json::from_str(body).map_err(|e| {
            error!("Perplexity response is not valid JSON: {e}");
            Error::Parse(format!("invalid JSON: {e}"))
        })?;

        let answer = parsed
            .choices
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                error!("Perplexity response is missing choices[0].message.content");
                Error::Parse("missing choices[0].message.content".into())
            })?;

        let citations = extract_citations(parsed.citations.as_ref());

        // The zero default for a failed estimate is decided here, not inside
        // the estimator: a best-effort answer beats no answer.
        let estimated_cost =
            match UsageCounters::from_response(parsed.usage.as_ref(), citations.len()) {
                Ok(usage) => self.config.pricing.cost(&usage),
                Err(e) => {
                    error!("Cost estimation failed, defaulting to zero: {e}");
                    Decimal::ZERO
                }
            };

        debug!(
            "Parsed Perplexity response: {} chars answer, {} citation(s), est. cost ${estimated_cost}",
            answer.len(),
            citations.len(),
        );
        Ok(QueryResult {
            answer,
            citations,
            estimated_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_client() -> PerplexityClient {
        PerplexityClient::new(ClientConfig::new("test-key")).unwrap()
    }

    #[test]
    fn question_is_first_message_with_user_role() {
        let history = vec![
            json!({"role": "user", "content": "earlier question"}),
            json!({"role": "assistant", "content": "earlier answer"}),
        ];
        let messages = build_messages("new question", &history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::user("new question"));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[2].content, "earlier answer");
    }

    #[test]
    fn malformed_history_entries_are_dropped() {
        let history = vec![
            json!({"role": "user"}),
            json!({"content": "no role"}),
            json!({"role": 7, "content": "numeric role"}),
            json!("not even an object"),
            json!({"role": "assistant", "content": "kept"}),
        ];
        let messages = build_messages("q", &history);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "kept");
    }

    #[test]
    fn empty_history_yields_single_message() {
        let messages = build_messages("q", &[]);
        assert_eq!(messages, vec![Message::user("q")]);
    }

    #[test]
    fn history_round_trips_through_serialization() {
        let history = vec![
            json!({"role": "user", "content": "a"}),
            json!({"role": "assistant", "content": "b"}),
            json!({"role": "system", "content": "c"}),
        ];
        let messages = build_messages("q", &history);
        let reserialized: Vec<Value> = messages[1..]
            .iter()
            .map(|m| serde_json::to_value(m).unwrap())
            .collect();
        assert_eq!(reserialized, history);
    }

    #[test]
    fn citations_default_to_empty() {
        assert!(extract_citations(None).is_empty());
        assert!(extract_citations(Some(&json!("not an array"))).is_empty());
    }

    #[test]
    fn citations_keep_order_and_duplicates() {
        let raw = json!(["https://a.example", "https://b.example", "https://a.example"]);
        let citations = extract_citations(Some(&raw));
        assert_eq!(
            citations,
            vec!["https://a.example", "https://b.example", "https://a.example"]
        );
    }

    #[test]
    fn non_string_citation_entries_are_skipped() {
        let raw = json!(["https://a.example", 42, null]);
        assert_eq!(extract_citations(Some(&raw)), vec!["https://a.example"]);
    }

    #[test]
    fn parse_full_response() {
        let body = json!({
            "choices": [{"message": {"content": "the answer"}}],
            "usage": {"prompt_tokens": 1000, "completion_tokens": 2000},
            "citations": ["https://example.com"],
        })
        .to_string();
        let result = test_client().parse_response(&body).unwrap();
        assert_eq!(result.answer, "the answer");
        assert_eq!(result.citations, vec!["https://example.com"]);
        // Default sonar pricing: 1000/1e6 + 2000/1e6 + 1 * 5/1e3 = 0.008.
        assert_eq!(result.estimated_cost.to_string(), "0.0080");
    }

    #[test]
    fn parse_degenerate_response_zero_cost() {
        let body = r#"{"choices":[{"message":{"content":"hi"}}]}"#;
        let result = test_client().parse_response(body).unwrap();
        assert_eq!(result.answer, "hi");
        assert!(result.citations.is_empty());
        assert_eq!(result.estimated_cost, Decimal::ZERO);
    }

    #[test]
    fn malformed_usage_degrades_to_zero_cost() {
        let body = json!({
            "choices": [{"message": {"content": "hi"}}],
            "usage": {"prompt_tokens": "lots"},
        })
        .to_string();
        let result = test_client().parse_response(&body).unwrap();
        assert_eq!(result.estimated_cost, Decimal::ZERO);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = test_client().parse_response("not json").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn missing_answer_path_is_a_parse_error() {
        for body in [r#"{}"#, r#"{"choices":[]}"#, r#"{"choices":[{"message":{}}]}"#] {
            let err = test_client().parse_response(body).unwrap_err();
            assert!(matches!(err, Error::Parse(_)), "body: {body}");
        }
    }

    #[test]
    fn auth_headers_are_exactly_bearer_and_json() {
        let client = test_client();
        let headers = client.auth_headers();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer test-key");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn invalid_api_key_characters_fail_construction() {
        let err = PerplexityClient::new(ClientConfig::new("key\nwith-newline")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn invalid_config_fails_construction() {
        let err = PerplexityClient::new(ClientConfig::new("")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
