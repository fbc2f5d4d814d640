//! Record store contract.
//!
//! Every write operation is idempotent-safe: a record whose open time is
//! already stored is skipped, never overwritten. Uniqueness is enforced by
//! checking before inserting, so concurrent writers to one series must hold
//! the [`crate::SeriesLock`].

use cbf_md::{Candle, Interval};
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::error::StoreError;
use crate::record::StoredRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Outcome of one `bulk_insert_new` call. Rejected records are reported with
/// the error that rejected them; nothing is dropped silently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkInsertReport {
    pub requested: usize,
    pub already_present: usize,
    pub inserted: usize,
    pub rejected: Vec<(i64, StoreError)>,
}

impl BulkInsertReport {
    pub fn merge(&mut self, other: &BulkInsertReport) {
        self.requested += other.requested;
        self.already_present += other.already_present;
        self.inserted += other.inserted;
        self.rejected.extend(other.rejected.iter().cloned());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesBounds {
    pub first_open_time: DateTime<Utc>,
    pub last_open_time: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Interval the stored series is keyed on.
    fn interval(&self) -> Interval;

    /// Create the series storage if absent. "Already exists" is success.
    async fn ensure_series_initialized(&self) -> Result<(), StoreError>;

    async fn exists(&self, open_time: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Existence check, then alignment + decimal validation, then insert.
    async fn upsert_if_absent(&self, candle: &Candle) -> Result<UpsertOutcome, StoreError>;

    /// Insert an already-converted record (gap filling) if absent.
    async fn insert_record_if_absent(
        &self,
        record: &StoredRecord,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Skip existing open times, validate the rest, insert the valid ones as
    /// one unordered batch. `Err` only for failures that prevent the batch
    /// from being evaluated at all.
    async fn bulk_insert_new(&self, candles: &[Candle]) -> Result<BulkInsertReport, StoreError>;

    /// Records with `start <= open_time <= end`, ascending by open time,
    /// delivered one at a time.
    fn range_scan<'a>(
        &'a self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'a, Result<StoredRecord, StoreError>>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// First and last stored open time, `None` for an empty series.
    async fn bounds(&self) -> Result<Option<SeriesBounds>, StoreError>;
}

/// Split a page into records to insert and the report entries for the rest.
///
/// `is_stored` answers existence by open time (ms). A repeated open time
/// inside the page counts as already present after its first occurrence.
pub(crate) fn plan_bulk_insert(
    candles: &[Candle],
    interval: Interval,
    is_stored: impl Fn(i64) -> bool,
) -> (Vec<StoredRecord>, BulkInsertReport) {
    let mut report = BulkInsertReport {
        requested: candles.len(),
        ..BulkInsertReport::default()
    };
    let mut seen = std::collections::HashSet::with_capacity(candles.len());
    let mut to_insert = Vec::with_capacity(candles.len());

    for c in candles {
        if is_stored(c.open_time_ms) || !seen.insert(c.open_time_ms) {
            report.already_present += 1;
            continue;
        }
        match StoredRecord::from_candle(c, interval) {
            Ok(rec) => to_insert.push(rec),
            Err(e) => {
                tracing::warn!(open_time_ms = c.open_time_ms, error = %e, "record rejected");
                report.rejected.push((c.open_time_ms, e));
            }
        }
    }

    (to_insert, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_ms: i64) -> Candle {
        Candle {
            open_time_ms: open_ms,
            open: "1".to_string(),
            high: "1".to_string(),
            low: "1".to_string(),
            close: "1".to_string(),
            volume: "1".to_string(),
            close_time_ms: open_ms + 59_999,
            quote_volume: "1".to_string(),
            trade_count: 1,
            taker_buy_base: "1".to_string(),
            taker_buy_quote: "1".to_string(),
        }
    }

    #[test]
    fn plan_skips_stored_and_in_page_duplicates() {
        let page = vec![candle(0), candle(60_000), candle(60_000), candle(120_000)];
        let (rows, report) = plan_bulk_insert(&page, Interval::M1, |ms| ms == 0);
        assert_eq!(rows.len(), 2);
        assert_eq!(report.requested, 4);
        assert_eq!(report.already_present, 2);
        assert!(report.rejected.is_empty());
    }

    #[test]
    fn plan_reports_rejections_without_blocking_others() {
        let mut bad = candle(180_000);
        bad.volume = "x".to_string();
        let page = vec![candle(0), candle(90_000), bad, candle(240_000)];
        let (rows, report) = plan_bulk_insert(&page, Interval::M1, |_| false);
        assert_eq!(
            rows.iter().map(|r| r.open_time_ms()).collect::<Vec<_>>(),
            vec![0, 240_000]
        );
        assert_eq!(report.rejected.len(), 2);
        assert!(matches!(report.rejected[0].1, StoreError::Alignment { .. }));
        assert!(matches!(
            report.rejected[1].1,
            StoreError::Parse { field: "volume", .. }
        ));
    }

    #[test]
    fn report_merge_accumulates() {
        let mut a = BulkInsertReport {
            requested: 2,
            inserted: 2,
            ..Default::default()
        };
        let b = BulkInsertReport {
            requested: 3,
            already_present: 1,
            inserted: 1,
            rejected: vec![(5, StoreError::backend("insert", "x"))],
        };
        a.merge(&b);
        assert_eq!((a.requested, a.already_present, a.inserted), (5, 1, 3));
        assert_eq!(a.rejected.len(), 1);
    }
}
