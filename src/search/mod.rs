//! Parallel depth-first backtracking search
//!
//! The engine explores the tree implied by a [`Problem`](crate::problem::Problem):
//! partial solutions are popped from a shared stack, expanded with the
//! successor callback, and each child is either accepted as a solution,
//! pushed back for later expansion, or pruned.

pub mod parallel;
pub mod result;

pub use parallel::{
    ControlMessage, Engine, EngineConfig, Frontier, FrontierMode, ProbeAck, SearchOutcome,
    SolutionSink, run_search,
};
pub use result::{SearchReport, SearchStatistics, WorkerExit, WorkerStats, WorkerSummary};
