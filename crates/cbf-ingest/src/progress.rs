use tracing::info;

/// Whole-percent progress tracker for one phase. Observational only.
#[derive(Debug, Clone)]
pub struct Progress {
    phase: &'static str,
    total: u64,
    done: u64,
    last_pct: u64,
}

impl Progress {
    pub fn new(phase: &'static str, total: u64) -> Self {
        Self {
            phase,
            total,
            done: 0,
            last_pct: 0,
        }
    }

    /// Count one unit. Returns the new percentage when it crossed a whole
    /// percent (and logs it), `None` otherwise.
    pub fn advance(&mut self) -> Option<u64> {
        self.done = (self.done + 1).min(self.total);
        let pct = self.percent();
        if pct <= self.last_pct {
            return None;
        }
        self.last_pct = pct;
        info!(phase = self.phase, done = self.done, total = self.total, "{pct}% complete");
        Some(pct)
    }

    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            100
        } else {
            self.done * 100 / self.total
        }
    }
}
