//! Binance-compatible kline HTTP client.
//!
//! `GET {base_url}{klines_path}?symbol=&interval=&startTime=&endTime=&limit=`
//!
//! Stateless apart from the pooled `reqwest::Client`. Rate limiting is handled
//! by [`send_with_backoff`]; everything else that is not a 200 is terminal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::backoff::{send_with_backoff, RawResponse, Sleeper, TokioSleeper};
use crate::candle::{decode_klines_page, Candle};
use crate::provider::{FetchError, FetchRequest, KlineSource};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
pub const DEFAULT_KLINES_PATH: &str = "/api/v3/klines";
/// Largest `limit` the klines endpoint serves in one page.
pub const MAX_PAGE_LIMIT: u32 = 1_000;

#[derive(Clone)]
pub struct BinanceKlineClient {
    http: reqwest::Client,
    base_url: String,
    klines_path: String,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for BinanceKlineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceKlineClient")
            .field("base_url", &self.base_url)
            .field("klines_path", &self.klines_path)
            .finish()
    }
}

impl BinanceKlineClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            klines_path: DEFAULT_KLINES_PATH.to_string(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_config(base_url: String, klines_path: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build upstream http client failed")?;
        Ok(Self {
            http,
            base_url,
            klines_path,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the backoff sleeper (tests inject a non-sleeping one).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn build_klines_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.klines_path.trim_start_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl KlineSource for BinanceKlineClient {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<Candle>, FetchError> {
        let url = self.build_klines_url();
        let query: Vec<(&str, String)> = vec![
            ("symbol", req.symbol.clone()),
            ("interval", req.interval.as_str().to_string()),
            ("startTime", req.start_time_ms.to_string()),
            ("endTime", req.end_time_ms.to_string()),
            ("limit", req.limit.to_string()),
        ];

        debug!(
            symbol = %req.symbol,
            interval = %req.interval,
            start_ms = req.start_time_ms,
            end_ms = req.end_time_ms,
            limit = req.limit,
            "fetch klines page"
        );

        let http = &self.http;
        let url = url.as_str();
        let query = query.as_slice();
        let resp = send_with_backoff(self.sleeper.as_ref(), move || async move {
            let resp = http
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp
                .text()
                .await
                .map_err(|e| FetchError::Transport(format!("read body failed: {e}")))?;

            Ok(RawResponse {
                status,
                retry_after,
                body,
            })
        })
        .await?;

        into_candles(resp)
    }
}

/// Map a final (non-429) response to a decoded page.
pub fn into_candles(resp: RawResponse) -> Result<Vec<Candle>, FetchError> {
    if resp.status != 200 {
        return Err(FetchError::Upstream {
            status: resp.status,
            body: resp.body,
        });
    }
    decode_klines_page(&resp.body)
}
