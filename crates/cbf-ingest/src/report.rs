use cbf_db::BulkInsertReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub open_time_ms: i64,
    pub reason: String,
}

/// A boundary still missing after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedBoundary {
    pub open_time: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub source: String,
    pub symbol: String,
    pub interval: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    pub windows_total: usize,
    pub windows_failed: usize,

    pub records_requested: usize,
    pub records_inserted: usize,
    pub records_already_present: usize,
    pub records_rejected: Vec<RejectedRecord>,

    pub reconciled: bool,
    pub boundaries_checked: u64,
    pub boundaries_missing: u64,
    pub boundaries_backfilled: u64,
    pub unresolved: Vec<UnresolvedBoundary>,
}

impl IngestReport {
    pub(crate) fn absorb_bulk(&mut self, r: &BulkInsertReport) {
        self.records_requested += r.requested;
        self.records_inserted += r.inserted;
        self.records_already_present += r.already_present;
        self.records_rejected
            .extend(r.rejected.iter().map(|(t, e)| RejectedRecord {
                open_time_ms: *t,
                reason: e.to_string(),
            }));
    }

    /// Every boundary of the range is known to be stored. Without a
    /// reconciliation pass this can only be claimed when no window failed
    /// and no record was rejected.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
            && (self.reconciled || (self.windows_failed == 0 && self.records_rejected.is_empty()))
    }
}
