//! Gap detection over an ascending record stream.
//!
//! One pass, O(1) state: only the previous record's reference time is kept.
//! A gap is emitted when `current.open_time - previous.reference > I`
//! (strict, so exactly-`I` spacing is never a gap).

use std::fmt;

use cbf_db::{RecordStore, StoreError, StoredRecord};
use cbf_md::Interval;
use chrono::{DateTime, Duration, Utc};
use futures_util::{future, Stream, TryStreamExt};

/// Which time of the previous record a gap is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapReference {
    /// Open-to-open spacing; used for reporting missing boundaries.
    OpenTime,
    /// Previous-close-to-open spacing; used when filling.
    CloseTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: Duration,
    /// Interval boundaries absent between the two records.
    pub missing: i64,
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gap detected between {} and {}: {} minutes ({} missing)",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            self.duration.num_minutes(),
            self.missing
        )
    }
}

#[derive(Debug, Clone)]
pub struct GapScanner {
    interval_secs: i64,
    reference: GapReference,
    prev: Option<DateTime<Utc>>,
}

impl GapScanner {
    pub fn new(interval: Interval, reference: GapReference) -> Self {
        Self {
            interval_secs: interval.as_secs(),
            reference,
            prev: None,
        }
    }

    /// Feed the next record (ascending). Returns the gap ending at it, if any.
    pub fn observe(&mut self, rec: &StoredRecord) -> Option<Gap> {
        let gap = self.prev.and_then(|prev| {
            let duration = rec.open_time - prev;
            let secs = duration.num_seconds();
            if secs <= self.interval_secs {
                return None;
            }
            let steps = secs / self.interval_secs;
            let missing = match self.reference {
                GapReference::OpenTime => steps - 1,
                GapReference::CloseTime => steps,
            };
            Some(Gap {
                start: prev,
                end: rec.open_time,
                duration,
                missing,
            })
        });

        self.prev = Some(match self.reference {
            GapReference::OpenTime => rec.open_time,
            GapReference::CloseTime => rec.close_time,
        });
        gap
    }
}

/// Lazily map an ascending record stream to the gaps it contains.
pub fn gap_stream<'a, S>(
    records: S,
    interval: Interval,
    reference: GapReference,
) -> impl Stream<Item = Result<Gap, StoreError>> + 'a
where
    S: Stream<Item = Result<StoredRecord, StoreError>> + 'a,
{
    let mut scanner = GapScanner::new(interval, reference);
    records.try_filter_map(move |rec| future::ready(Ok(scanner.observe(&rec))))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapSummary {
    pub records_scanned: u64,
    pub gaps: Vec<Gap>,
}

impl GapSummary {
    pub fn total_missing(&self) -> i64 {
        self.gaps.iter().map(|g| g.missing).sum()
    }

    pub fn largest(&self) -> Option<&Gap> {
        self.gaps.iter().max_by_key(|g| g.duration)
    }

    pub fn is_contiguous(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Scan `[start, end]` of the stored series and collect every gap.
pub async fn scan_gaps(
    store: &dyn RecordStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    reference: GapReference,
) -> Result<GapSummary, StoreError> {
    let mut scanner = GapScanner::new(store.interval(), reference);
    let mut summary = GapSummary::default();

    let mut records = store.range_scan(start, end);
    while let Some(rec) = records.try_next().await? {
        summary.records_scanned += 1;
        if let Some(gap) = scanner.observe(&rec) {
            tracing::info!(
                start = %gap.start,
                end = %gap.end,
                minutes = gap.duration.num_minutes(),
                missing = gap.missing,
                "gap detected"
            );
            summary.gaps.push(gap);
        }
    }
    Ok(summary)
}
