//! Search reports and statistics

use std::fmt;
use std::time::Duration;

/// Counters kept by a single worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Partial solutions popped and expanded
    pub expansions: u64,
    /// Candidate extensions produced by `successors`
    pub candidates: u64,
    /// Candidates accepted as solutions
    pub accepted: u64,
    /// Candidates rejected by `is_valid`
    pub pruned: u64,
    /// Candidates pushed back onto the frontier
    pub pushed: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.expansions += other.expansions;
        self.candidates += other.candidates;
        self.accepted += other.accepted;
        self.pruned += other.pruned;
        self.pushed += other.pushed;
    }
}

/// How a worker left its search loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Observed a terminate signal.
    Stopped,
    /// Frontier exhausted with every worker idle.
    Drained,
    /// A callback failed or the worker panicked.
    Failed,
    /// Did not exit within the stop grace period and was left to finish on its own.
    Detached,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Stopped => write!(f, "stopped"),
            WorkerExit::Drained => write!(f, "drained"),
            WorkerExit::Failed => write!(f, "failed"),
            WorkerExit::Detached => write!(f, "detached"),
        }
    }
}

/// Final state of one worker.
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub worker_id: usize,
    pub exit: WorkerExit,
    pub stats: WorkerStats,
}

/// Aggregate statistics for one engine session.
#[derive(Debug, Clone, Default)]
pub struct SearchStatistics {
    /// Wall time from `start` until the pool was torn down
    pub elapsed_time: Duration,
    /// Number of workers spawned
    pub workers: usize,
    /// Totals across all workers that reported back
    pub totals: WorkerStats,
    /// Largest frontier size observed so far
    pub frontier_peak: usize,
    /// Partial solutions still pending when the session ended
    pub frontier_remaining: usize,
}

impl SearchStatistics {
    /// Get expansions per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed_time.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.totals.expansions as f64 / secs
        }
    }

    /// Fraction of candidates rejected by the validity callback (0.0 to 1.0)
    pub fn prune_rate(&self) -> f64 {
        if self.totals.candidates == 0 {
            0.0
        } else {
            self.totals.pruned as f64 / self.totals.candidates as f64
        }
    }

    /// Format statistics as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Workers: {}\n", self.workers));
        s.push_str(&format!("Time: {:.2?}\n", self.elapsed_time));
        s.push_str(&format!("Expansions: {}\n", self.totals.expansions));
        s.push_str(&format!(
            "Throughput: {:.0} expansions/sec\n",
            self.throughput()
        ));
        s.push_str(&format!(
            "Candidates: {} ({:.1}% pruned)\n",
            self.totals.candidates,
            self.prune_rate() * 100.0
        ));
        s.push_str(&format!("Solutions accepted: {}\n", self.totals.accepted));
        s.push_str(&format!(
            "Frontier: peak {}, {} remaining\n",
            self.frontier_peak, self.frontier_remaining
        ));
        s
    }
}

/// What `stop` or `join` hands back once the pool is torn down.
#[derive(Debug, Clone, Default)]
pub struct SearchReport {
    pub statistics: SearchStatistics,
    /// One entry per spawned worker, ordered by worker id
    pub workers: Vec<WorkerSummary>,
}

impl SearchReport {
    /// True if every worker ended because the search space ran out.
    pub fn exhausted(&self) -> bool {
        !self.workers.is_empty() && self.workers.iter().all(|w| w.exit == WorkerExit::Drained)
    }

    /// Ids of workers that outlived the stop grace period.
    pub fn detached(&self) -> Vec<usize> {
        self.workers
            .iter()
            .filter(|w| w.exit == WorkerExit::Detached)
            .map(|w| w.worker_id)
            .collect()
    }
}
