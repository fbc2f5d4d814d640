//! cbf-ingest
//!
//! Drives the upstream client and the record store over a historical range:
//! windowed bulk ingestion followed by a per-boundary reconciliation pass.

pub mod driver;
pub mod progress;
pub mod report;
pub mod windows;

pub use driver::{ingest_range, IngestError, IngestPlan};
pub use report::{IngestReport, RejectedRecord, UnresolvedBoundary};
pub use windows::{plan_windows, Window};
