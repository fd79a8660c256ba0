//! The shared, stack-ordered frontier of pending partial solutions.
//!
//! The frontier is a mutex/condvar guarded stack. Workers take part in a
//! session through a [`Participant`], which carries the idle bookkeeping used
//! to detect quiescence: the search is over only when the stack is empty and
//! every registered worker is waiting in `pop` at the same time. A bare
//! "stack is empty" check would race with a worker that is about to push
//! children.
//!
//! There is no capacity bound. A problem whose successors fan out faster
//! than the workers consume them grows the stack without limit; bounding the
//! branching factor is the caller's responsibility.

use crate::problem::PartialSolution;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Outcome of a worker pop.
#[derive(Debug)]
pub enum Pop<C> {
    /// The most recently pushed partial solution.
    Item(PartialSolution<C>),
    /// Nothing available right now (polling mode only).
    Empty,
    /// A control signal arrived while waiting; go back to the mailbox.
    Interrupted,
    /// Every worker is idle and the stack is empty, or the session ended.
    Drained,
}

struct FrontierState<C> {
    stack: Vec<PartialSolution<C>>,
    peak: usize,
    session: u64,
    registered: usize,
    idle: usize,
    drained: bool,
}

impl<C> FrontierState<C> {
    fn quiescent(&self) -> bool {
        self.stack.is_empty() && self.registered > 0 && self.idle >= self.registered
    }
}

/// Concurrent LIFO container of partial solutions awaiting expansion.
pub struct Frontier<C> {
    state: Mutex<FrontierState<C>>,
    available: Condvar,
    /// Bumped on every interrupt so sleepers can tell they were signalled.
    epoch: AtomicU64,
}

impl<C> Default for Frontier<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Frontier<C> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FrontierState {
                stack: Vec::new(),
                peak: 0,
                session: 0,
                registered: 0,
                idle: 0,
                drained: false,
            }),
            available: Condvar::new(),
            epoch: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a partial solution. Never blocks.
    pub fn push(&self, partial: PartialSolution<C>) {
        let mut state = self.lock();
        state.stack.push(partial);
        state.peak = state.peak.max(state.stack.len());
        drop(state);
        self.available.notify_one();
    }

    /// Add several partial solutions under one lock. The last one is popped first.
    pub fn push_all(&self, partials: impl IntoIterator<Item = PartialSolution<C>>) {
        let mut state = self.lock();
        let before = state.stack.len();
        state.stack.extend(partials);
        let added = state.stack.len() - before;
        state.peak = state.peak.max(state.stack.len());
        drop(state);
        match added {
            0 => {}
            1 => self.available.notify_one(),
            _ => self.available.notify_all(),
        }
    }

    /// Remove the most recently pushed partial solution, if any.
    ///
    /// This is the driver-side pop; it does not take part in idle accounting.
    pub fn try_pop(&self) -> Option<PartialSolution<C>> {
        self.lock().stack.pop()
    }

    /// Approximate number of pending partial solutions. Stale as soon as it returns.
    pub fn len(&self) -> usize {
        self.lock().stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().stack.is_empty()
    }

    /// Largest size the stack has reached.
    pub fn peak_len(&self) -> usize {
        self.lock().peak
    }

    /// Remove and return every pending partial solution, oldest first.
    pub fn take_all(&self) -> Vec<PartialSolution<C>> {
        std::mem::take(&mut self.lock().stack)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Wake every worker blocked in `pop` so it revisits its mailbox.
    pub(crate) fn interrupt(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        // A popper that saw the old epoch holds the lock until it waits
        drop(self.lock());
        self.available.notify_all();
    }

    /// Begin a new worker session and hand out one participant per worker.
    ///
    /// Pending partial solutions carry over from the previous session.
    pub(crate) fn open_session(self: &Arc<Self>, workers: usize) -> Vec<Participant<C>> {
        let mut state = self.lock();
        state.session += 1;
        state.registered = workers;
        state.idle = 0;
        state.drained = false;
        let session = state.session;
        drop(state);
        // Wake sleepers from an abandoned session so they notice it ended.
        self.available.notify_all();

        (0..workers)
            .map(|_| Participant {
                frontier: Arc::clone(self),
                session,
                idle: false,
            })
            .collect()
    }
}

impl<C: Clone> Frontier<C> {
    /// Copy of every pending partial solution, oldest first.
    pub fn snapshot(&self) -> Vec<PartialSolution<C>> {
        self.lock().stack.clone()
    }
}

impl<C> fmt::Debug for Frontier<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Frontier")
            .field("len", &state.stack.len())
            .field("peak", &state.peak)
            .field("session", &state.session)
            .field("idle", &state.idle)
            .field("registered", &state.registered)
            .finish()
    }
}

/// A worker's membership in one frontier session.
///
/// Dropping the participant removes the worker from the session; if the
/// remaining workers are all idle on an empty stack, they are released.
pub(crate) struct Participant<C> {
    frontier: Arc<Frontier<C>>,
    session: u64,
    idle: bool,
}

impl<C> Participant<C> {
    fn settle(&mut self, state: &mut FrontierState<C>) {
        if self.idle && state.session == self.session {
            state.idle -= 1;
        }
        self.idle = false;
    }

    fn mark_idle(&mut self, state: &mut FrontierState<C>) {
        if !self.idle {
            state.idle += 1;
            self.idle = true;
        }
        if state.quiescent() {
            state.drained = true;
            self.frontier.available.notify_all();
        }
    }

    /// Pop, suspending while the stack is empty.
    ///
    /// `epoch` must be read before the caller last checked its mailbox, so a
    /// signal sent in between is never slept through.
    pub(crate) fn pop_blocking(&mut self, epoch: u64) -> Pop<C> {
        let frontier = Arc::clone(&self.frontier);
        let mut state = frontier.lock();
        loop {
            if state.session != self.session || state.drained {
                self.settle(&mut state);
                return Pop::Drained;
            }
            if frontier.epoch() != epoch {
                self.settle(&mut state);
                return Pop::Interrupted;
            }
            if let Some(partial) = state.stack.pop() {
                self.settle(&mut state);
                return Pop::Item(partial);
            }
            self.mark_idle(&mut state);
            if state.drained {
                continue;
            }
            state = frontier
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Pop without waiting. An empty result counts this worker as idle until
    /// its next successful pop.
    pub(crate) fn poll(&mut self) -> Pop<C> {
        let frontier = Arc::clone(&self.frontier);
        let mut state = frontier.lock();
        if state.session != self.session || state.drained {
            self.settle(&mut state);
            return Pop::Drained;
        }
        if let Some(partial) = state.stack.pop() {
            self.settle(&mut state);
            return Pop::Item(partial);
        }
        self.mark_idle(&mut state);
        if state.drained {
            Pop::Drained
        } else {
            Pop::Empty
        }
    }
}

impl<C> Drop for Participant<C> {
    fn drop(&mut self) {
        let mut state = self.frontier.lock();
        if state.session != self.session {
            return;
        }
        if self.idle {
            state.idle -= 1;
        }
        state.registered -= 1;
        if !state.drained && state.quiescent() {
            state.drained = true;
            self.frontier.available.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    fn partial(choices: &[u32]) -> PartialSolution<u32> {
        PartialSolution::from(choices.to_vec())
    }

    #[test]
    fn test_lifo_order() {
        let frontier = Frontier::new();
        frontier.push(partial(&[1]));
        frontier.push(partial(&[2]));
        frontier.push_all(vec![partial(&[3]), partial(&[4])]);

        assert_eq!(frontier.len(), 4);
        assert_eq!(frontier.try_pop(), Some(partial(&[4])));
        assert_eq!(frontier.try_pop(), Some(partial(&[3])));
        assert_eq!(frontier.try_pop(), Some(partial(&[2])));
        assert_eq!(frontier.try_pop(), Some(partial(&[1])));
        assert_eq!(frontier.try_pop(), None);
        assert_eq!(frontier.peak_len(), 4);
    }

    #[test]
    fn test_snapshot_and_take_all() {
        let frontier = Frontier::new();
        frontier.push_all((0..3).map(|i| partial(&[i])));

        let snapshot = frontier.snapshot();
        assert_eq!(snapshot, vec![partial(&[0]), partial(&[1]), partial(&[2])]);
        assert_eq!(frontier.len(), 3);

        let taken = frontier.take_all();
        assert_eq!(taken, snapshot);
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_single_participant_drains_when_empty() {
        let frontier = Arc::new(Frontier::<u32>::new());
        frontier.push(partial(&[7]));
        let mut participants = frontier.open_session(1);
        let mut worker = participants.pop().unwrap();

        let epoch = frontier.epoch();
        assert!(matches!(worker.pop_blocking(epoch), Pop::Item(_)));
        assert!(matches!(worker.pop_blocking(epoch), Pop::Drained));
    }

    #[test]
    fn test_busy_participant_prevents_quiescence() {
        let frontier = Arc::new(Frontier::<u32>::new());
        let mut participants = frontier.open_session(2);
        let mut b = participants.pop().unwrap();
        let mut a = participants.pop().unwrap();

        // `a` is idle, `b` has not popped yet and so counts as busy
        assert!(matches!(a.poll(), Pop::Empty));
        assert!(matches!(a.poll(), Pop::Empty));

        // Once `b` also comes up empty, the session is over for both
        assert!(matches!(b.poll(), Pop::Drained));
        assert!(matches!(a.poll(), Pop::Drained));
    }

    #[test]
    fn test_idle_poller_resumes_when_work_arrives() {
        let frontier = Arc::new(Frontier::<u32>::new());
        let mut participants = frontier.open_session(2);
        let _busy = participants.pop().unwrap();
        let mut a = participants.pop().unwrap();

        assert!(matches!(a.poll(), Pop::Empty));
        frontier.push(partial(&[1]));
        assert!(matches!(a.poll(), Pop::Item(_)));
    }

    #[test]
    fn test_interrupt_wakes_blocked_pop() {
        let frontier = Arc::new(Frontier::<u32>::new());
        let mut participants = frontier.open_session(2);
        let _other = participants.pop().unwrap();
        let mut worker = participants.pop().unwrap();

        let epoch = frontier.epoch();
        let handle = thread::spawn(move || matches!(worker.pop_blocking(epoch), Pop::Interrupted));

        thread::sleep(Duration::from_millis(20));
        frontier.interrupt();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_stale_epoch_returns_immediately() {
        let frontier = Arc::new(Frontier::<u32>::new());
        let mut participants = frontier.open_session(2);
        let _other = participants.pop().unwrap();
        let mut worker = participants.pop().unwrap();

        let epoch = frontier.epoch();
        frontier.interrupt();
        assert!(matches!(worker.pop_blocking(epoch), Pop::Interrupted));
    }

    #[test]
    fn test_epoch_read_skips_the_lock() {
        let frontier = Arc::new(Frontier::<u32>::new());
        frontier.interrupt();
        frontier.interrupt();

        let guard = frontier.lock();
        let reader = Arc::clone(&frontier);
        let epoch = thread::spawn(move || reader.epoch()).join().unwrap();
        drop(guard);
        assert_eq!(epoch, 2);
    }

    #[test]
    fn test_leaving_participant_releases_idle_peers() {
        let frontier = Arc::new(Frontier::<u32>::new());
        let mut participants = frontier.open_session(2);
        let leaver = participants.pop().unwrap();
        let mut waiter = participants.pop().unwrap();

        let epoch = frontier.epoch();
        let handle = thread::spawn(move || matches!(waiter.pop_blocking(epoch), Pop::Drained));

        thread::sleep(Duration::from_millis(20));
        drop(leaver);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_new_session_ends_old_participants() {
        let frontier = Arc::new(Frontier::<u32>::new());
        let mut old = frontier.open_session(1).pop().unwrap();
        frontier.push(partial(&[1]));

        let mut fresh = frontier.open_session(1).pop().unwrap();
        assert!(matches!(old.poll(), Pop::Drained));
        drop(old);

        // The stale participant must not disturb the new session's counts
        assert!(matches!(fresh.poll(), Pop::Item(_)));
        assert!(matches!(fresh.poll(), Pop::Drained));
    }

    #[test]
    fn test_concurrent_pops_are_exclusive() {
        let frontier = Arc::new(Frontier::<u32>::new());
        frontier.push_all((0..1000).map(|i| partial(&[i])));
        let participants = frontier.open_session(4);

        let handles: Vec<_> = participants
            .into_iter()
            .map(|mut p| {
                let frontier = Arc::clone(&frontier);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    loop {
                        match p.pop_blocking(frontier.epoch()) {
                            Pop::Item(item) => seen.push(item[0]),
                            Pop::Drained => return seen,
                            Pop::Empty | Pop::Interrupted => {}
                        }
                    }
                })
            })
            .collect();

        let mut all = HashSet::new();
        let mut total = 0;
        for handle in handles {
            let seen = handle.join().unwrap();
            total += seen.len();
            all.extend(seen);
        }
        assert_eq!(total, 1000);
        assert_eq!(all.len(), 1000);
    }
}
