//! cbf-md
//!
//! Upstream candle ingest: interval vocabulary, the wire-level [`Candle`],
//! the [`KlineSource`] abstraction and the HTTP client that implements it.
//!
//! This crate does **not** write to the store; the ingestion driver fetches
//! pages here and hands them to `cbf-db`.

pub mod backoff;
pub mod candle;
pub mod client;
pub mod provider;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use backoff::{send_with_backoff, RawResponse, Sleeper, TokioSleeper};
pub use candle::{decode_klines_page, Candle};
pub use client::{BinanceKlineClient, DEFAULT_BASE_URL, DEFAULT_KLINES_PATH, MAX_PAGE_LIMIT};
pub use provider::{FetchError, FetchRequest, KlineSource};

/// Nominal candle interval.
///
/// Canonical strings match the upstream kline interval codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    pub fn as_secs(&self) -> i64 {
        match self {
            Interval::M1 => 60,
            Interval::M3 => 180,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::M30 => 1_800,
            Interval::H1 => 3_600,
            Interval::H4 => 14_400,
            Interval::D1 => 86_400,
        }
    }

    pub fn as_millis(&self) -> i64 {
        self.as_secs() * 1_000
    }

    /// `true` when `ts_ms` sits exactly on an interval boundary.
    pub fn is_aligned_ms(&self, ts_ms: i64) -> bool {
        ts_ms.rem_euclid(self.as_millis()) == 0
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "1m" | "1min" => Ok(Interval::M1),
            "3m" | "3min" => Ok(Interval::M3),
            "5m" | "5min" => Ok(Interval::M5),
            "15m" | "15min" => Ok(Interval::M15),
            "30m" | "30min" => Ok(Interval::M30),
            "1h" | "1H" => Ok(Interval::H1),
            "4h" | "4H" => Ok(Interval::H4),
            "1d" | "1D" => Ok(Interval::D1),
            other => Err(anyhow!(
                "invalid interval '{}'. expected one of: 1m | 3m | 5m | 15m | 30m | 1h | 4h | 1d",
                other
            )),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -----------------
// Tests (no network)
// -----------------
