//! In-memory record store for tests.
//!
//! Same contract as the Postgres store. Failure injection:
//! - `fail_insert_at(t)`: any insert of open time `t` fails with `Backend`;
//! - `fail_init()`: `ensure_series_initialized` fails.
//!
//! `range_scan` snapshots the requested range, so writes during a scan are
//! not observed by that scan.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use cbf_md::{Candle, Interval};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;

use crate::error::StoreError;
use crate::record::{ms_to_utc, StoredRecord};
use crate::store::{plan_bulk_insert, BulkInsertReport, RecordStore, SeriesBounds, UpsertOutcome};

#[derive(Debug, Default)]
struct State {
    initialized: bool,
    records: BTreeMap<i64, StoredRecord>,
    fail_insert_at: HashSet<i64>,
    fail_init: bool,
    insert_calls: usize,
}

#[derive(Debug)]
pub struct MemoryRecordStore {
    interval: Interval,
    state: Mutex<State>,
}

impl MemoryRecordStore {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            state: Mutex::new(State::default()),
        }
    }

    /// Pre-seeded store; records are keyed by open time as-is (no validation).
    pub fn with_records(interval: Interval, records: impl IntoIterator<Item = StoredRecord>) -> Self {
        let store = Self::new(interval);
        {
            let mut st = store.lock();
            st.initialized = true;
            for r in records {
                st.records.insert(r.open_time_ms(), r);
            }
        }
        store
    }

    pub fn fail_insert_at(&self, open_time: DateTime<Utc>) {
        self.lock().fail_insert_at.insert(open_time.timestamp_millis());
    }

    pub fn fail_init(&self) {
        self.lock().fail_init = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Number of attempted record writes (including injected failures).
    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }

    /// All stored records, ascending by open time.
    pub fn snapshot(&self) -> Vec<StoredRecord> {
        self.lock().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_locked(st: &mut State, rec: StoredRecord) -> Result<(), StoreError> {
        st.insert_calls += 1;
        let key = rec.open_time_ms();
        if st.fail_insert_at.contains(&key) {
            return Err(StoreError::backend(
                "insert",
                format!("injected failure at {key}ms"),
            ));
        }
        st.records.insert(key, rec);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    fn interval(&self) -> Interval {
        self.interval
    }

    async fn ensure_series_initialized(&self) -> Result<(), StoreError> {
        let mut st = self.lock();
        if st.fail_init {
            return Err(StoreError::backend("create_table", "injected init failure"));
        }
        st.initialized = true;
        Ok(())
    }

    async fn exists(&self, open_time: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.lock().records.contains_key(&open_time.timestamp_millis()))
    }

    async fn upsert_if_absent(&self, candle: &Candle) -> Result<UpsertOutcome, StoreError> {
        let mut st = self.lock();
        if st.records.contains_key(&candle.open_time_ms) {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        let rec = StoredRecord::from_candle(candle, self.interval)?;
        Self::insert_locked(&mut st, rec)?;
        Ok(UpsertOutcome::Inserted)
    }

    async fn insert_record_if_absent(
        &self,
        record: &StoredRecord,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut st = self.lock();
        if st.records.contains_key(&record.open_time_ms()) {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        Self::insert_locked(&mut st, record.clone())?;
        Ok(UpsertOutcome::Inserted)
    }

    async fn bulk_insert_new(&self, candles: &[Candle]) -> Result<BulkInsertReport, StoreError> {
        let mut st = self.lock();
        let (rows, mut report) =
            plan_bulk_insert(candles, self.interval, |ms| st.records.contains_key(&ms));
        for rec in rows {
            let key = rec.open_time_ms();
            match Self::insert_locked(&mut st, rec) {
                Ok(()) => report.inserted += 1,
                Err(e) => report.rejected.push((key, e)),
            }
        }
        Ok(report)
    }

    fn range_scan<'a>(
        &'a self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'a, Result<StoredRecord, StoreError>> {
        let rows: Vec<Result<StoredRecord, StoreError>> = if start > end {
            Vec::new()
        } else {
            self.lock()
                .records
                .range(start.timestamp_millis()..=end.timestamp_millis())
                .map(|(_, r)| Ok(r.clone()))
                .collect()
        };
        stream::iter(rows).boxed()
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.lock().records.len() as i64)
    }

    async fn bounds(&self) -> Result<Option<SeriesBounds>, StoreError> {
        let st = self.lock();
        let first = st.records.values().next();
        let last = st.records.values().next_back();
        Ok(match (first, last) {
            (Some(f), Some(l)) => Some(SeriesBounds {
                first_open_time: f.open_time,
                last_open_time: l.open_time,
            }),
            _ => None,
        })
    }
}

/// Build a real-looking record at `open_ms` with the given close, for seeding.
pub fn seed_record(open_ms: i64, interval: Interval, close: f64) -> Result<StoredRecord, StoreError> {
    let open_time = ms_to_utc(open_ms, "open_time")?;
    let mut rec = StoredRecord::synthetic(open_time, interval, close);
    rec.volume = 1.0;
    rec.quote_volume = close;
    rec.trade_count = 1;
    Ok(rec)
}
