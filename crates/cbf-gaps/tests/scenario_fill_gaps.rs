// Gap filling against the in-memory store.

use cbf_db::memory::seed_record;
use cbf_db::{MemoryRecordStore, RecordStore, SeriesLock, StoreError, StoredRecord};
use cbf_gaps::{fill_gaps, scan_gaps, FillError, GapReference};
use cbf_md::Interval;
use chrono::{DateTime, TimeZone, Utc};

const MIN: i64 = 60_000;

fn at_min(m: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(m * 60, 0).unwrap()
}

fn store_with(points: &[(i64, f64)]) -> MemoryRecordStore {
    let recs: Vec<StoredRecord> = points
        .iter()
        .map(|(m, close)| seed_record(m * MIN, Interval::M1, *close).unwrap())
        .collect();
    MemoryRecordStore::with_records(Interval::M1, recs)
}

fn all() -> (DateTime<Utc>, DateTime<Utc>) {
    (at_min(0), at_min(10_000))
}

#[tokio::test]
async fn three_missing_intervals_interpolate_linearly() {
    let store = store_with(&[(0, 100.0), (4, 130.0)]);
    let lock = SeriesLock::new();
    let (start, end) = all();

    let report = fill_gaps(&store, &lock, start, end).await.unwrap();
    assert_eq!(report.gaps_filled, 1);
    assert_eq!(report.synthetic_inserted, 3);

    let rows = store.snapshot();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    assert_eq!(closes, vec![100.0, 107.5, 115.0, 122.5, 130.0]);

    for synthetic in &rows[1..4] {
        assert_eq!(synthetic.open, synthetic.close);
        assert_eq!(synthetic.high, synthetic.low);
        assert_eq!(synthetic.volume, 0.0);
        assert_eq!(synthetic.trade_count, 0);
        assert_eq!(synthetic.taker_buy_quote, 0.0);
    }
}

#[tokio::test]
async fn filled_series_is_evenly_spaced() {
    let store = store_with(&[(0, 10.0), (1, 11.0), (5, 15.0), (6, 16.0), (9, 10.0), (20, 21.0)]);
    let lock = SeriesLock::new();
    let (start, end) = all();

    fill_gaps(&store, &lock, start, end).await.unwrap();

    let rows = store.snapshot();
    assert_eq!(rows.len(), 21);
    for pair in rows.windows(2) {
        assert_eq!((pair[1].open_time - pair[0].open_time).num_seconds(), 60);
        assert!(Interval::M1.is_aligned_ms(pair[1].open_time_ms()));
    }

    let after = scan_gaps(&store, start, end, GapReference::OpenTime).await.unwrap();
    assert!(after.is_contiguous());
    assert_eq!(after.records_scanned, 21);
}

#[tokio::test]
async fn refill_is_idempotent() {
    let store = store_with(&[(0, 1.0), (3, 4.0), (8, 2.0)]);
    let lock = SeriesLock::new();
    let (start, end) = all();

    let first = fill_gaps(&store, &lock, start, end).await.unwrap();
    assert_eq!(first.synthetic_inserted, 6);
    let before = store.snapshot();

    let second = fill_gaps(&store, &lock, start, end).await.unwrap();
    assert_eq!(second.synthetic_inserted, 0);
    assert_eq!(second.gaps_filled, 0);
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn contiguous_series_is_untouched() {
    let store = store_with(&[(0, 1.0), (1, 2.0), (2, 3.0)]);
    let lock = SeriesLock::new();
    let (start, end) = all();

    let report = fill_gaps(&store, &lock, start, end).await.unwrap();
    assert_eq!(report.records_read, 3);
    assert_eq!(report.gaps_filled, 0);
    assert_eq!(store.insert_calls(), 0);
}

#[tokio::test]
async fn write_failure_aborts_pass_and_rerun_completes() {
    let store = store_with(&[(0, 100.0), (4, 130.0), (10, 10.0)]);
    store.fail_insert_at(at_min(2));
    let lock = SeriesLock::new();
    let (start, end) = all();

    let err = fill_gaps(&store, &lock, start, end).await.unwrap_err();
    match &err {
        FillError::Write { open_time, source } => {
            assert_eq!(*open_time, at_min(2));
            assert!(matches!(source, StoreError::Backend { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // First synthetic landed, nothing after the failure did.
    assert_eq!(store.len(), 4);
    assert!(!store.exists(at_min(3)).await.unwrap());
    assert!(!store.exists(at_min(5)).await.unwrap());

    // Lock is released on the error path.
    assert!(lock.try_write().is_some());

    let fresh = MemoryRecordStore::with_records(Interval::M1, store.snapshot());
    let report = fill_gaps(&fresh, &lock, start, end).await.unwrap();
    assert_eq!(report.synthetic_inserted, 7);
    assert_eq!(fresh.len(), 11);

    // The resumed ramp lands on the same values an uninterrupted pass writes.
    let closes: Vec<f64> = fresh.snapshot()[..5].iter().map(|r| r.close).collect();
    assert_eq!(closes, vec![100.0, 107.5, 115.0, 122.5, 130.0]);
}

#[tokio::test]
async fn fill_respects_range_bounds() {
    let store = store_with(&[(0, 1.0), (5, 6.0), (10, 11.0)]);
    let lock = SeriesLock::new();

    let report = fill_gaps(&store, &lock, at_min(5), at_min(10)).await.unwrap();
    assert_eq!(report.records_read, 2);
    assert_eq!(report.synthetic_inserted, 4);
    assert!(!store.exists(at_min(1)).await.unwrap());
    assert!(store.exists(at_min(9)).await.unwrap());
}
