//! Persisted record shape and the candle -> record conversion.
//!
//! Conversion policy:
//! - open time must sit on an interval boundary, otherwise `Alignment`;
//! - times are stored at second precision (`ms / 1000`);
//! - decimal strings are parsed to `f64`; malformed or non-finite text is a
//!   `Parse` error naming the field.

use cbf_md::{Candle, Interval};
use chrono::{DateTime, Utc};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trade_count: i64,
    pub taker_buy_base: f64,
    pub taker_buy_quote: f64,
}

impl StoredRecord {
    /// Validate and convert one upstream candle.
    pub fn from_candle(c: &Candle, interval: Interval) -> Result<Self, StoreError> {
        if !interval.is_aligned_ms(c.open_time_ms) {
            return Err(StoreError::Alignment {
                open_time_ms: c.open_time_ms,
                interval_secs: interval.as_secs(),
            });
        }

        Ok(Self {
            open_time: ms_to_utc(c.open_time_ms, "open_time")?,
            close_time: ms_to_utc(c.close_time_ms, "close_time")?,
            open: parse_decimal("open", &c.open)?,
            high: parse_decimal("high", &c.high)?,
            low: parse_decimal("low", &c.low)?,
            close: parse_decimal("close", &c.close)?,
            volume: parse_decimal("volume", &c.volume)?,
            quote_volume: parse_decimal("quote_volume", &c.quote_volume)?,
            trade_count: c.trade_count,
            taker_buy_base: parse_decimal("taker_buy_base", &c.taker_buy_base)?,
            taker_buy_quote: parse_decimal("taker_buy_quote", &c.taker_buy_quote)?,
        })
    }

    /// Interpolated stand-in for a missing interval: flat OHLC at `price`,
    /// zero volume and trade fields, upstream close-time convention.
    pub fn synthetic(open_time: DateTime<Utc>, interval: Interval, price: f64) -> Self {
        Self {
            open_time,
            close_time: close_time_for(open_time, interval),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            quote_volume: 0.0,
            trade_count: 0,
            taker_buy_base: 0.0,
            taker_buy_quote: 0.0,
        }
    }

    pub fn open_time_ms(&self) -> i64 {
        self.open_time.timestamp_millis()
    }
}

/// `open + I - 1s`, the second-precision form of the upstream close time.
pub fn close_time_for(open_time: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    open_time + chrono::Duration::seconds(interval.as_secs() - 1)
}

/// Epoch milliseconds -> UTC timestamp truncated to whole seconds.
pub fn ms_to_utc(ms: i64, field: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp(ms.div_euclid(1_000), 0).ok_or_else(|| StoreError::Parse {
        field,
        raw: ms.to_string(),
    })
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, StoreError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(StoreError::Parse {
            field,
            raw: raw.to_string(),
        }),
    }
}
