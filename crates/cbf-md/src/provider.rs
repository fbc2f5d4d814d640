//! Source boundary for candle ingestion.
//!
//! This module defines **only** the request type, the error taxonomy and the
//! source trait. No HTTP, no decoding, no storage logic belong here.

use std::fmt;

use crate::candle::Candle;
use crate::Interval;

// ---------------------------------------------------------------------------
// Fetch request
// ---------------------------------------------------------------------------

/// One bounded page request against the upstream candle endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Ticker symbol exactly as the upstream expects it (e.g. `"BTCUSDT"`).
    pub symbol: String,
    pub interval: Interval,
    /// Inclusive window start, UTC epoch milliseconds.
    pub start_time_ms: i64,
    /// Inclusive window end, UTC epoch milliseconds.
    pub end_time_ms: i64,
    /// Page size cap. The upstream clamps this on its side as well.
    pub limit: u32,
}

impl FetchRequest {
    /// Request for exactly one interval starting at `open_time_ms`.
    pub fn single(symbol: &str, interval: Interval, open_time_ms: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            start_time_ms: open_time_ms,
            end_time_ms: open_time_ms + interval.as_millis() - 1,
            limit: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that a [`KlineSource`] implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network or transport failure before a status was received.
    Transport(String),
    /// Non-success, non-429 HTTP outcome. Never retried.
    Upstream { status: u16, body: String },
    /// 429 without a usable `Retry-After`, so the wait cannot be gated.
    RateLimited { retry_after: Option<String> },
    /// Page shape did not match the fixed-arity kline layout.
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::Upstream { status, body } => {
                write!(f, "upstream error status={status}: {body}")
            }
            FetchError::RateLimited {
                retry_after: Some(raw),
            } => write!(f, "rate limited with unusable Retry-After '{raw}'"),
            FetchError::RateLimited { retry_after: None } => {
                write!(f, "rate limited without Retry-After header")
            }
            FetchError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Upstream candle source contract.
///
/// Object-safe so the driver can hold a `&dyn KlineSource`. Implementations
/// are stateless apart from their transport.
#[async_trait::async_trait]
pub trait KlineSource: Send + Sync {
    /// Human-readable name identifying this source (e.g. `"binance"`).
    fn name(&self) -> &'static str;

    /// Fetch one page of candles, ascending by open time as the upstream
    /// returns them. A malformed page fails as a whole.
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<Candle>, FetchError>;
}
