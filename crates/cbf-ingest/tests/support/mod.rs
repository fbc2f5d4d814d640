//! Deterministic upstream for driver scenarios.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use cbf_md::{Candle, FetchError, FetchRequest, Interval, KlineSource};

pub const MIN: i64 = 60_000;

pub fn candle(open_ms: i64, interval: Interval) -> Candle {
    let px = format!("{}.5", 100 + (open_ms / MIN) % 50);
    Candle {
        open_time_ms: open_ms,
        open: px.clone(),
        high: px.clone(),
        low: px.clone(),
        close: px,
        volume: "2".to_string(),
        close_time_ms: open_ms + interval.as_millis() - 1,
        quote_volume: "200".to_string(),
        trade_count: 3,
        taker_buy_base: "1".to_string(),
        taker_buy_quote: "100".to_string(),
    }
}

/// Serves every aligned boundary in `[startTime, endTime]` up to `limit`,
/// minus the configured holes and failures.
pub struct ScriptedSource {
    interval: Interval,
    /// Boundaries the upstream never has.
    pub holes: HashSet<i64>,
    /// Boundaries dropped from multi-record pages only; single fetches succeed.
    pub page_holes: HashSet<i64>,
    /// Window start times whose page fetch fails (single fetches still work).
    pub failing_windows: HashSet<i64>,
    /// Extra candles appended to the page whose window contains them.
    pub extra: Vec<Candle>,
    pub requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedSource {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            holes: HashSet::new(),
            page_holes: HashSet::new(),
            failing_windows: HashSet::new(),
            extra: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn single_requests(&self) -> Vec<FetchRequest> {
        self.requests().into_iter().filter(|r| r.limit == 1).collect()
    }
}

#[async_trait::async_trait]
impl KlineSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<Candle>, FetchError> {
        self.requests.lock().unwrap().push(req.clone());

        let single = req.limit == 1;
        if !single && self.failing_windows.contains(&req.start_time_ms) {
            return Err(FetchError::Upstream {
                status: 503,
                body: "maintenance".to_string(),
            });
        }

        let step = self.interval.as_millis();
        let mut page = Vec::new();
        let mut t = req.start_time_ms;
        while t <= req.end_time_ms && page.len() < req.limit as usize {
            let dropped = self.holes.contains(&t) || (!single && self.page_holes.contains(&t));
            if !dropped {
                page.push(candle(t, self.interval));
            }
            t += step;
        }
        if !single {
            page.extend(
                self.extra
                    .iter()
                    .filter(|c| c.open_time_ms >= req.start_time_ms && c.open_time_ms <= req.end_time_ms)
                    .cloned(),
            );
        }
        Ok(page)
    }
}
