use cbf_db::memory::seed_record;
use cbf_db::MemoryRecordStore;
use cbf_gaps::{scan_gaps, GapReference};
use cbf_md::Interval;
use chrono::{Duration, TimeZone, Utc};

#[tokio::test]
async fn report_summarizes_gaps_inside_range_only() {
    let opens = [0_i64, 1, 2, 4, 5, 9, 10, 30];
    let store = MemoryRecordStore::with_records(
        Interval::M1,
        opens
            .iter()
            .map(|m| seed_record(m * 60_000, Interval::M1, 1.0).unwrap()),
    );

    let summary = scan_gaps(
        &store,
        Utc.timestamp_opt(0, 0).unwrap(),
        Utc.timestamp_opt(10 * 60, 0).unwrap(),
        GapReference::OpenTime,
    )
    .await
    .unwrap();

    assert_eq!(summary.records_scanned, 7);
    assert_eq!(summary.gaps.len(), 2);
    assert_eq!(summary.total_missing(), 1 + 3);
    assert_eq!(summary.largest().unwrap().duration, Duration::minutes(4));
    assert!(!summary.is_contiguous());
}

#[tokio::test]
async fn empty_range_has_no_gaps() {
    let store = MemoryRecordStore::new(Interval::H1);
    let summary = scan_gaps(
        &store,
        Utc.timestamp_opt(0, 0).unwrap(),
        Utc.timestamp_opt(86_400, 0).unwrap(),
        GapReference::OpenTime,
    )
    .await
    .unwrap();
    assert_eq!(summary.records_scanned, 0);
    assert!(summary.is_contiguous());
}
