//! Cost estimation from response usage counters.
//!
//! Perplexity bills input/output tokens per million and searches per
//! thousand; the response does not carry a search count, so the number of
//! citations stands in for it (see <https://docs.perplexity.ai/guides/pricing>).
//!
//! Extraction ([`UsageCounters::from_response`]) is fallible; the arithmetic
//! ([`PriceSchedule::cost`]) is pure and total. The query path decides what a
//! failed extraction is worth — it logs and coerces to [`Decimal::ZERO`]
//! rather than letting a billing estimate abort an otherwise good answer.

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

/// Token and search counts extracted from a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCounters {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Citation count, used as a proxy for billed searches.
    pub search_count: u64,
}

/// Why usage counters could not be read from a response.
#[derive(Debug, thiserror::Error)]
pub enum CostError {
    #[error("response has no `usage` field")]
    MissingUsage,
    #[error("`usage.{0}` is missing")]
    MissingField(&'static str),
    #[error("`usage.{0}` is not a non-negative integer")]
    NotAnInteger(&'static str),
}

impl UsageCounters {
    /// Read token counters out of the raw `usage` value, taking the citation
    /// count as the search count.
    pub fn from_response(usage: Option<&Value>, citation_count: usize) -> Result<Self, CostError> {
        let usage = usage.ok_or(CostError::MissingUsage)?;
        Ok(Self {
            prompt_tokens: counter(usage, "prompt_tokens")?,
            completion_tokens: counter(usage, "completion_tokens")?,
            search_count: citation_count as u64,
        })
    }
}

fn counter(usage: &Value, field: &'static str) -> Result<u64, CostError> {
    usage
        .get(field)
        .ok_or(CostError::MissingField(field))?
        .as_u64()
        .ok_or(CostError::NotAnInteger(field))
}

/// Prices for one model, loaded once at client construction.
///
/// Token prices are USD per million tokens; the search price is USD per
/// thousand searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSchedule {
    pub input_per_million: Decimal,
    pub output_per_million: Decimal,
    pub search_per_thousand: Decimal,
}

impl PriceSchedule {
    /// Estimated USD cost for one call, quantized to 4 decimal places with
    /// half-up tie-breaking. Non-negative for any non-negative schedule.
    pub fn cost(&self, usage: &UsageCounters) -> Decimal {
        let raw = Decimal::from(usage.prompt_tokens) * self.input_per_million
            / Decimal::from(1_000_000u32)
            + Decimal::from(usage.completion_tokens) * self.output_per_million
                / Decimal::from(1_000_000u32)
            + Decimal::from(usage.search_count) * self.search_per_thousand
                / Decimal::from(1_000u32);
        let mut cost = raw.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
        // Pad short scales so the result always carries 4 fractional digits.
        cost.rescale(4);
        cost
    }
}
