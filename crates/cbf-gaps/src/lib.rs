//! cbf-gaps
//!
//! Gap analysis and linear gap filling over a stored candle series.

pub mod analyzer;
pub mod filler;

pub use analyzer::{gap_stream, scan_gaps, Gap, GapReference, GapScanner, GapSummary};
pub use filler::{fill_gaps, FillError, FillReport};
