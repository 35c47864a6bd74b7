//! Coalescer statistics.

use crate::target::TargetId;

/// Running counters since the coalescer was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Requests received (direct and through request handles).
    pub requests: u64,
    /// Requests merged into an already-pending request.
    pub coalesced: u64,
    /// Requests merged into a render in progress.
    pub deferred: u64,
    /// Render action calls made by processing passes (`start` and `monitor`).
    pub render_calls: u64,
    /// Renders that completed.
    pub completed: u64,
    /// Renders that were aborted.
    pub aborted: u64,
    /// Forced (synchronous) renders.
    pub forced: u64,
    /// Processing passes run.
    pub passes: u64,
    /// Times the timer was started.
    pub timer_starts: u64,
    /// Times the timer was stopped.
    pub timer_stops: u64,
}

impl CoalescerStats {
    /// Fraction of requests that did not cause their own render.
    #[must_use]
    pub fn coalescing_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            (self.coalesced + self.deferred) as f64 / self.requests as f64
        }
    }
}

/// What one processing pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Targets whose render was started this pass, in call order.
    pub started: Vec<TargetId>,
    /// Targets whose render completed this pass.
    pub completed: Vec<TargetId>,
    /// Targets whose render was aborted this pass.
    pub aborted: Vec<TargetId>,
    /// Targets still in progress after the pass.
    pub in_progress: Vec<TargetId>,
    /// Targets requested again during the pass, rendered next pass.
    pub requeued: Vec<TargetId>,
}

impl PassReport {
    /// Returns true if the pass did nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.started.is_empty()
            && self.completed.is_empty()
            && self.aborted.is_empty()
            && self.in_progress.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalescing_ratio() {
        let stats = CoalescerStats {
            requests: 10,
            coalesced: 6,
            deferred: 2,
            ..CoalescerStats::default()
        };
        assert!((stats.coalescing_ratio() - 0.8).abs() < f64::EPSILON);
        assert!(CoalescerStats::default().coalescing_ratio().abs() < f64::EPSILON);
    }
}
