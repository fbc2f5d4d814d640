//! Wire-level candle and the typed page decoder.
//!
//! The upstream returns a JSON array of fixed-arity arrays:
//!
//! ```text
//! [openTime, open, high, low, close, volume, closeTime,
//!  quoteVolume, tradeCount, takerBuyBase, takerBuyQuote, (ignored)]
//! ```
//!
//! Times and trade count are JSON numbers; prices and volumes are decimal
//! strings. The whole page is validated before anything is returned.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::FetchError;

/// Minimum element count of one kline row.
const KLINE_ARITY: usize = 11;
/// Binance appends one unused trailing element.
const KLINE_ARITY_WITH_IGNORED: usize = 12;

/// A single candle as returned by the upstream.
///
/// Prices and volumes stay as decimal strings; conversion (and its failure
/// mode) belongs to the store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, UTC epoch milliseconds.
    pub open_time_ms: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    /// Close time, UTC epoch milliseconds (upstream convention: open + I - 1ms).
    pub close_time_ms: i64,
    pub quote_volume: String,
    /// Trade count, truncated to an integer at decode time.
    pub trade_count: i64,
    pub taker_buy_base: String,
    pub taker_buy_quote: String,
}

/// Decode one upstream page body into candles.
///
/// Fails with [`FetchError::Decode`] on the first row with the wrong arity or
/// a field of the wrong JSON type; no partial page is ever returned.
pub fn decode_klines_page(body: &str) -> Result<Vec<Candle>, FetchError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("page is not an array of arrays: {e}")))?;

    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        out.push(decode_row(i, row)?);
    }
    Ok(out)
}

fn decode_row(i: usize, row: &[Value]) -> Result<Candle, FetchError> {
    if row.len() != KLINE_ARITY && row.len() != KLINE_ARITY_WITH_IGNORED {
        return Err(FetchError::Decode(format!(
            "row {i}: expected {KLINE_ARITY} elements, got {}",
            row.len()
        )));
    }

    Ok(Candle {
        open_time_ms: number_trunc(i, row, 0, "open_time")?,
        open: text(i, row, 1, "open")?,
        high: text(i, row, 2, "high")?,
        low: text(i, row, 3, "low")?,
        close: text(i, row, 4, "close")?,
        volume: text(i, row, 5, "volume")?,
        close_time_ms: number_trunc(i, row, 6, "close_time")?,
        quote_volume: text(i, row, 7, "quote_volume")?,
        trade_count: number_trunc(i, row, 8, "trade_count")?,
        taker_buy_base: text(i, row, 9, "taker_buy_base")?,
        taker_buy_quote: text(i, row, 10, "taker_buy_quote")?,
    })
}

fn text(i: usize, row: &[Value], idx: usize, field: &str) -> Result<String, FetchError> {
    row[idx].as_str().map(str::to_string).ok_or_else(|| {
        FetchError::Decode(format!(
            "row {i}: field '{field}' (index {idx}) must be a string, got {}",
            row[idx]
        ))
    })
}

/// Accept integral and fractional JSON numbers; fractional values are truncated.
fn number_trunc(i: usize, row: &[Value], idx: usize, field: &str) -> Result<i64, FetchError> {
    let v = &row[idx];
    if let Some(n) = v.as_i64() {
        return Ok(n);
    }
    match v.as_f64() {
        Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
        _ => Err(FetchError::Decode(format!(
            "row {i}: field '{field}' (index {idx}) must be a number, got {v}"
        ))),
    }
}
