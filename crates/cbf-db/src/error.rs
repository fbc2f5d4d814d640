use std::fmt;

/// Errors surfaced by [`crate::RecordStore`] implementations.
///
/// `Alignment` and `Parse` are record-level: they reject one candidate and
/// leave the store untouched. `Backend` is an I/O or query failure of the
/// persistence layer itself.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Open time is not a whole multiple of the series interval.
    Alignment { open_time_ms: i64, interval_secs: i64 },
    /// A decimal field did not parse to a finite float.
    Parse { field: &'static str, raw: String },
    /// Creation / insert / query failure.
    Backend { op: &'static str, message: String },
}

impl StoreError {
    pub fn backend(op: &'static str, err: impl fmt::Display) -> Self {
        StoreError::Backend {
            op,
            message: err.to_string(),
        }
    }

    /// `true` for errors that concern one candidate record only.
    pub fn is_record_level(&self) -> bool {
        matches!(self, StoreError::Alignment { .. } | StoreError::Parse { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Alignment {
                open_time_ms,
                interval_secs,
            } => write!(
                f,
                "open time {open_time_ms}ms is not aligned to a {interval_secs}s interval boundary"
            ),
            StoreError::Parse { field, raw } => {
                write!(f, "field '{field}' is not a valid decimal: '{raw}'")
            }
            StoreError::Backend { op, message } => write!(f, "store {op} failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}
