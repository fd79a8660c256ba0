//! Ordered selections of `k` distinct values from `1..=n`.

use crate::error::CallbackResult;
use crate::problem::Problem;

/// Every ordered choice of `k` distinct values out of `1..=n`.
#[derive(Debug, Clone, Copy)]
pub struct Permutations {
    n: u32,
    k: usize,
}

impl Permutations {
    pub fn new(n: u32, k: usize) -> Self {
        Self { n, k }
    }

    /// Number of solutions: n! / (n - k)!, or `None` if it does not fit in a `u64`.
    pub fn count(&self) -> Option<u64> {
        if self.k > self.n as usize {
            return Some(0);
        }
        (0..self.k as u64).try_fold(1u64, |acc, i| acc.checked_mul(u64::from(self.n) - i))
    }
}

impl Problem for Permutations {
    type Choice = u32;

    fn successors(&self, partial: &[u32]) -> CallbackResult<Vec<u32>> {
        if partial.len() >= self.k {
            return Ok(Vec::new());
        }
        Ok((1..=self.n).filter(|v| !partial.contains(v)).collect())
    }

    fn is_valid(&self, candidate: &[u32]) -> CallbackResult<bool> {
        Ok(candidate.len() <= self.k)
    }

    fn is_complete(&self, candidate: &[u32]) -> CallbackResult<bool> {
        Ok(candidate.len() == self.k)
    }
}
