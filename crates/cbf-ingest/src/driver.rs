//! Ingestion driver.
//!
//! Two phases over `[start, end)`:
//! 1. bulk: one upstream page per window, stored with `bulk_insert_new`.
//!    A failed fetch or store call is logged and the window skipped.
//! 2. reconciliation: every interval boundary is checked; missing ones are
//!    fetched individually (`limit = 1`) and upserted. Boundaries the
//!    upstream still cannot supply are reported as unresolved.
//!
//! Only an invalid range or a failed store initialization aborts the run.

use std::fmt;

use cbf_db::{RecordStore, SeriesLock, StoreError, UpsertOutcome};
use cbf_md::{FetchRequest, KlineSource, MAX_PAGE_LIMIT};
use chrono::{DateTime, Duration, Utc};
use futures_util::{stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::progress::Progress;
use crate::report::{IngestReport, UnresolvedBoundary};
use crate::windows::{plan_windows, Window};

#[derive(Debug, Clone)]
pub struct IngestPlan {
    pub symbol: String,
    pub start: DateTime<Utc>,
    /// Exclusive.
    pub end: DateTime<Utc>,
    pub window_intervals: u32,
    pub window_concurrency: usize,
    pub reconcile: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reason: String,
    },
    StoreInit(StoreError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::InvalidRange { start, end, reason } => write!(
                f,
                "invalid ingest range [{}, {}): {reason}",
                start.to_rfc3339(),
                end.to_rfc3339()
            ),
            IngestError::StoreInit(e) => write!(f, "store initialization failed: {e}"),
        }
    }
}

impl std::error::Error for IngestError {}

fn validate_plan(plan: &IngestPlan, store: &dyn RecordStore) -> Result<(), IngestError> {
    let invalid = |reason: String| IngestError::InvalidRange {
        start: plan.start,
        end: plan.end,
        reason,
    };
    let interval = store.interval();

    if plan.start >= plan.end {
        return Err(invalid("start must be before end".to_string()));
    }
    if !interval.is_aligned_ms(plan.start.timestamp_millis()) {
        return Err(invalid(format!("start is not aligned to {interval}")));
    }
    if plan.window_intervals == 0 || plan.window_intervals > MAX_PAGE_LIMIT {
        return Err(invalid(format!(
            "window_intervals must be 1..={MAX_PAGE_LIMIT}, got {}",
            plan.window_intervals
        )));
    }
    Ok(())
}

/// Run both phases against `store`, serializing writes through `lock`.
pub async fn ingest_range(
    source: &dyn KlineSource,
    store: &dyn RecordStore,
    lock: &SeriesLock,
    plan: &IngestPlan,
) -> Result<IngestReport, IngestError> {
    validate_plan(plan, store)?;
    store
        .ensure_series_initialized()
        .await
        .map_err(IngestError::StoreInit)?;

    let interval = store.interval();
    let windows = plan_windows(
        plan.start.timestamp_millis(),
        plan.end.timestamp_millis(),
        interval,
        plan.window_intervals,
    );

    let mut report = IngestReport {
        run_id: Uuid::new_v4(),
        source: source.name().to_string(),
        symbol: plan.symbol.clone(),
        interval: interval.to_string(),
        start: plan.start,
        end: plan.end,
        windows_total: windows.len(),
        windows_failed: 0,
        records_requested: 0,
        records_inserted: 0,
        records_already_present: 0,
        records_rejected: Vec::new(),
        reconciled: false,
        boundaries_checked: 0,
        boundaries_missing: 0,
        boundaries_backfilled: 0,
        unresolved: Vec::new(),
    };

    info!(
        run_id = %report.run_id,
        source = source.name(),
        symbol = %plan.symbol,
        interval = %interval,
        start = %plan.start,
        end = %plan.end,
        windows = windows.len(),
        "ingest started"
    );

    bulk_phase(source, store, lock, plan, &windows, &mut report).await;

    if plan.reconcile {
        reconcile_phase(source, store, lock, plan, &mut report).await;
        report.reconciled = true;
    }

    info!(
        run_id = %report.run_id,
        inserted = report.records_inserted,
        already_present = report.records_already_present,
        rejected = report.records_rejected.len(),
        windows_failed = report.windows_failed,
        backfilled = report.boundaries_backfilled,
        unresolved = report.unresolved.len(),
        complete = report.is_complete(),
        "ingest finished"
    );
    Ok(report)
}

async fn bulk_phase(
    source: &dyn KlineSource,
    store: &dyn RecordStore,
    lock: &SeriesLock,
    plan: &IngestPlan,
    windows: &[Window],
    report: &mut IngestReport,
) {
    let interval = store.interval();
    let symbol = plan.symbol.as_str();
    let limit = plan.window_intervals;
    let mut progress = Progress::new("bulk", windows.len() as u64);

    // Fetches may run ahead up to `window_concurrency`; results are consumed
    // and stored in window order.
    let mut pages = std::pin::pin!(stream::iter(windows.iter().copied())
        .map(|w| async move {
            let res = source.fetch(&w.request(symbol, interval, limit)).await;
            (w, res)
        })
        .buffered(plan.window_concurrency.max(1)));

    while let Some((w, res)) = pages.next().await {
        match res {
            Ok(page) => {
                let _guard = lock.write().await;
                match store.bulk_insert_new(&page).await {
                    Ok(r) => {
                        for (t, e) in &r.rejected {
                            warn!(window = w.index, open_time_ms = *t, error = %e, "record rejected");
                        }
                        report.absorb_bulk(&r);
                    }
                    Err(e) => {
                        report.windows_failed += 1;
                        warn!(
                            window = w.index,
                            start_ms = w.start_ms,
                            end_ms = w.end_ms,
                            error = %e,
                            "window store failed; skipped"
                        );
                    }
                }
            }
            Err(e) => {
                report.windows_failed += 1;
                warn!(
                    window = w.index,
                    start_ms = w.start_ms,
                    end_ms = w.end_ms,
                    error = %e,
                    "window fetch failed; skipped"
                );
            }
        }
        progress.advance();
    }
}

async fn reconcile_phase(
    source: &dyn KlineSource,
    store: &dyn RecordStore,
    lock: &SeriesLock,
    plan: &IngestPlan,
    report: &mut IngestReport,
) {
    let interval = store.interval();
    let step = interval.as_secs();
    let span = (plan.end - plan.start).num_seconds().max(0);
    let total = (span + step - 1) / step;
    let mut progress = Progress::new("reconcile", total as u64);

    for k in 0..total {
        let boundary = plan.start + Duration::seconds(k * step);
        report.boundaries_checked += 1;

        match store.exists(boundary).await {
            Ok(true) => {}
            Ok(false) => {
                report.boundaries_missing += 1;
                match backfill_boundary(source, store, lock, &plan.symbol, boundary).await {
                    Ok(()) => report.boundaries_backfilled += 1,
                    Err(reason) => {
                        warn!(open_time = %boundary, reason = %reason, "boundary unresolved");
                        report.unresolved.push(UnresolvedBoundary {
                            open_time: boundary,
                            reason,
                        });
                    }
                }
            }
            Err(e) => {
                warn!(open_time = %boundary, error = %e, "existence check failed");
                report.unresolved.push(UnresolvedBoundary {
                    open_time: boundary,
                    reason: e.to_string(),
                });
            }
        }
        progress.advance();
    }
}

async fn backfill_boundary(
    source: &dyn KlineSource,
    store: &dyn RecordStore,
    lock: &SeriesLock,
    symbol: &str,
    boundary: DateTime<Utc>,
) -> Result<(), String> {
    let interval = store.interval();
    let open_ms = boundary.timestamp_millis();
    let req = FetchRequest::single(symbol, interval, open_ms);

    let page = source
        .fetch(&req)
        .await
        .map_err(|e| format!("single-interval fetch failed: {e}"))?;
    let candle = page
        .iter()
        .find(|c| c.open_time_ms == open_ms)
        .ok_or_else(|| "upstream returned no record for boundary".to_string())?;

    let _guard = lock.write().await;
    match store.upsert_if_absent(candle).await {
        Ok(UpsertOutcome::Inserted) => {
            info!(open_time = %boundary, "boundary backfilled");
            Ok(())
        }
        Ok(UpsertOutcome::AlreadyPresent) => Ok(()),
        Err(e) => Err(format!("backfill write failed: {e}")),
    }
}
