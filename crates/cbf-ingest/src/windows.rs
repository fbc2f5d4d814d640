//! Partitioning of `[start, end)` into bounded request windows.

use cbf_md::{FetchRequest, Interval};

/// Half-open window `[start_ms, end_ms)` of at most `W` intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub index: usize,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Window {
    /// Upstream request covering exactly this window. `endTime` is
    /// inclusive on the wire, so it is pulled back by 1ms.
    pub fn request(&self, symbol: &str, interval: Interval, limit: u32) -> FetchRequest {
        FetchRequest {
            symbol: symbol.to_string(),
            interval,
            start_time_ms: self.start_ms,
            end_time_ms: self.end_ms - 1,
            limit,
        }
    }

    pub fn intervals(&self, interval: Interval) -> i64 {
        (self.end_ms - self.start_ms + interval.as_millis() - 1) / interval.as_millis()
    }
}

/// Window `i` covers `[start + i*W*I, min(start + (i+1)*W*I, end))`. The
/// trailing partial window is included. Empty when `start >= end`.
pub fn plan_windows(start_ms: i64, end_ms: i64, interval: Interval, window_intervals: u32) -> Vec<Window> {
    let span = i64::from(window_intervals.max(1)) * interval.as_millis();
    let mut out = Vec::new();
    let mut lo = start_ms;
    while lo < end_ms {
        let hi = lo.saturating_add(span).min(end_ms);
        out.push(Window {
            index: out.len(),
            start_ms: lo,
            end_ms: hi,
        });
        lo = hi;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60_000;

    #[test]
    fn exact_multiple_yields_full_windows() {
        let w = plan_windows(0, 1000 * MIN, Interval::M1, 500);
        assert_eq!(w.len(), 2);
        assert_eq!((w[0].start_ms, w[0].end_ms), (0, 500 * MIN));
        assert_eq!((w[1].start_ms, w[1].end_ms), (500 * MIN, 1000 * MIN));
        assert_eq!(w[1].index, 1);
    }

    #[test]
    fn trailing_partial_window_is_included() {
        let w = plan_windows(0, 1001 * MIN, Interval::M1, 500);
        assert_eq!(w.len(), 3);
        assert_eq!(w[2].intervals(Interval::M1), 1);
    }

    #[test]
    fn empty_range_has_no_windows() {
        assert!(plan_windows(MIN, MIN, Interval::M1, 500).is_empty());
        assert!(plan_windows(2 * MIN, MIN, Interval::M1, 500).is_empty());
    }

    #[test]
    fn request_end_is_inclusive_and_does_not_overlap_next_window() {
        let w = plan_windows(0, 1000 * MIN, Interval::M1, 500);
        let r0 = w[0].request("BTCUSDT", Interval::M1, 500);
        let r1 = w[1].request("BTCUSDT", Interval::M1, 500);
        assert_eq!(r0.end_time_ms, 500 * MIN - 1);
        assert_eq!(r1.start_time_ms, 500 * MIN);
        assert_eq!(r0.limit, 500);
    }
}
