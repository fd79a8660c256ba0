//! Concurrent sink for accepted solutions.

use crate::problem::PartialSolution;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::fmt;

/// Holds accepted solutions until the driver drains them.
///
/// Backed by an unbounded channel, so `push` never blocks and each solution
/// is handed out by `drain` exactly once. No ordering between workers.
pub struct SolutionSink<C> {
    tx: Sender<PartialSolution<C>>,
    rx: Receiver<PartialSolution<C>>,
}

impl<C> Default for SolutionSink<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SolutionSink<C> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, solution: PartialSolution<C>) {
        // Both ends live in `self`, so the channel can never be disconnected
        let _ = self.tx.send(solution);
    }

    /// Remove and return every solution currently held.
    pub fn drain(&self) -> Vec<PartialSolution<C>> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

impl<C> fmt::Debug for SolutionSink<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolutionSink")
            .field("len", &self.len())
            .finish()
    }
}
