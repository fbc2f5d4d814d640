//! Typed backfill configuration.
//!
//! ```yaml
//! upstream:
//!   base_url: "https://api.binance.com"
//!   klines_path: "/api/v3/klines"
//!   request_timeout_secs: 10
//! series:
//!   symbol: "BTCUSDT"
//!   interval: "1m"
//!   table: "klines_btcusdt_1m"   # optional
//! ingest:
//!   start: "2018-01-01"
//!   end: "2024-01-01"            # optional: today 00:00 UTC
//!   window_intervals: 500
//!   window_concurrency: 1
//!   reconcile: true
//! store:
//!   max_connections: 5
//! ```

use anyhow::{anyhow, bail, Context, Result};
use cbf_md::{Interval, DEFAULT_BASE_URL, DEFAULT_KLINES_PATH, MAX_PAGE_LIMIT};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A fill pass streams a scan on one connection while writing on another.
pub const MIN_STORE_CONNECTIONS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackfillConfig {
    #[serde(default)]
    pub upstream: UpstreamSection,
    pub series: SeriesSection,
    pub ingest: IngestSection,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_klines_path")]
    pub klines_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            klines_path: default_klines_path(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeriesSection {
    pub symbol: String,
    pub interval: Interval,
    #[serde(default)]
    pub table: Option<String>,
}

impl SeriesSection {
    /// Configured table, or `klines_<symbol>_<interval>` in lower case.
    pub fn table_name(&self) -> String {
        match &self.table {
            Some(t) => t.clone(),
            None => format!(
                "klines_{}_{}",
                self.symbol.to_ascii_lowercase(),
                self.interval.as_str()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestSection {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default = "default_window_intervals")]
    pub window_intervals: u32,
    #[serde(default = "default_window_concurrency")]
    pub window_concurrency: usize,
    #[serde(default = "default_true")]
    pub reconcile: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_klines_path() -> String {
    DEFAULT_KLINES_PATH.to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_window_intervals() -> u32 {
    500
}
fn default_window_concurrency() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_max_connections() -> u32 {
    5
}

impl BackfillConfig {
    /// Resolved `[start, end)`. A missing `end` means 00:00 UTC of `now`'s day.
    pub fn ingest_range(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = parse_time(&self.ingest.start).context("ingest.start")?;
        let end = match &self.ingest.end {
            Some(raw) => parse_time(raw).context("ingest.end")?,
            None => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
        };
        Ok((start, end))
    }

    /// All checks that must hold before any component is built.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let up = &self.upstream;
        if !(up.base_url.starts_with("http://") || up.base_url.starts_with("https://")) {
            bail!("upstream.base_url must be an http(s) URL, got '{}'", up.base_url);
        }
        if up.request_timeout_secs == 0 {
            bail!("upstream.request_timeout_secs must be > 0");
        }

        let symbol = self.series.symbol.trim();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("series.symbol must be non-empty ASCII alphanumeric, got '{}'", self.series.symbol);
        }
        let table = self.series.table_name();
        if !is_plain_identifier(&table) {
            bail!("series.table '{table}' is not a plain SQL identifier");
        }

        let ing = &self.ingest;
        if ing.window_intervals == 0 || ing.window_intervals > MAX_PAGE_LIMIT {
            bail!(
                "ingest.window_intervals must be 1..={MAX_PAGE_LIMIT}, got {}",
                ing.window_intervals
            );
        }
        if ing.window_concurrency == 0 {
            bail!("ingest.window_concurrency must be >= 1");
        }

        let (start, end) = self.ingest_range(now)?;
        if start >= end {
            bail!("ingest.start ({start}) must be before ingest.end ({end})");
        }
        if !self.series.interval.is_aligned_ms(start.timestamp_millis()) {
            bail!(
                "ingest.start ({start}) is not aligned to the {} interval",
                self.series.interval
            );
        }

        if self.store.max_connections < MIN_STORE_CONNECTIONS {
            bail!(
                "store.max_connections must be >= {MIN_STORE_CONNECTIONS}, got {}",
                self.store.max_connections
            );
        }
        Ok(())
    }
}

/// RFC3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| anyhow!("invalid time '{raw}': expected RFC3339 or YYYY-MM-DD"))
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && s.len() <= 63
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
