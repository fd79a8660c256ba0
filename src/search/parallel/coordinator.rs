//! The orchestrator: owns the frontier, the solution sink and the worker pool.

use crate::error::{ConfigError, EngineError};
use crate::problem::{PartialSolution, Problem};
use crate::search::parallel::channel::{
    ControlMessage, CoordinatorChannels, ProbeAck, WorkerEvent, create_channels,
};
use crate::search::parallel::config::EngineConfig;
use crate::search::parallel::frontier::Frontier;
use crate::search::parallel::solutions::SolutionSink;
use crate::search::parallel::worker::{Verdict, Worker, classify};
use crate::search::result::{
    SearchReport, SearchStatistics, WorkerExit, WorkerStats, WorkerSummary,
};
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Parallel backtracking search over a [`Problem`].
///
/// The engine seeds its frontier on construction. `start` spawns a pool of
/// workers; `join` waits for them to finish and `stop` terminates them. After
/// either, `start` may be called again and the new pool continues from
/// whatever is left in the frontier.
pub struct Engine<P: Problem> {
    problem: Arc<P>,
    config: EngineConfig,
    frontier: Arc<Frontier<P::Choice>>,
    solutions: Arc<SolutionSink<P::Choice>>,
    /// A seed was already a complete solution (matters in greedy mode).
    seed_solved: bool,
    pool: Option<WorkerPool>,
}

struct WorkerPool {
    channels: CoordinatorChannels,
    handles: Vec<Option<JoinHandle<()>>>,
    summaries: Vec<Option<WorkerSummary>>,
    error: Option<EngineError>,
    started: Instant,
}

impl WorkerPool {
    fn live(&self) -> usize {
        self.summaries.iter().filter(|s| s.is_none()).count()
    }

    fn is_live(&self, worker_id: usize) -> bool {
        self.summaries
            .get(worker_id)
            .is_some_and(|summary| summary.is_none())
    }

    fn terminate_all<C>(&self, frontier: &Frontier<C>) {
        self.channels.broadcast(ControlMessage::Terminate);
        frontier.interrupt();
    }

    /// Record a terminal event. Probe answers are returned to the caller.
    fn record<C>(&mut self, event: WorkerEvent, frontier: &Frontier<C>) -> Option<ProbeAck> {
        match event {
            WorkerEvent::ProbeAck {
                worker_id,
                paused,
                stats,
            } => Some(ProbeAck {
                worker_id,
                paused,
                stats,
            }),
            WorkerEvent::Finished {
                worker_id,
                exit,
                stats,
            } => {
                self.summaries[worker_id] = Some(WorkerSummary {
                    worker_id,
                    exit,
                    stats,
                });
                None
            }
            WorkerEvent::Failed {
                worker_id,
                error,
                stats,
            } => {
                self.summaries[worker_id] = Some(WorkerSummary {
                    worker_id,
                    exit: WorkerExit::Failed,
                    stats,
                });
                if self.error.is_none() {
                    warn!(worker_id, %error, "stopping search after worker failure");
                    self.error = Some(error);
                    self.terminate_all(frontier);
                }
                None
            }
        }
    }

    /// Consume events until every worker has finished or `deadline` passes.
    /// Returns true if every worker finished.
    fn collect<C>(&mut self, frontier: &Frontier<C>, deadline: Option<Instant>) -> bool {
        while self.live() > 0 {
            let event = match deadline {
                Some(deadline) => self.channels.from_workers.recv_deadline(deadline),
                None => self
                    .channels
                    .from_workers
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match event {
                Ok(event) => {
                    self.record(event, frontier);
                }
                Err(RecvTimeoutError::Timeout) => return false,
                // All senders dropped, every worker thread is gone
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        true
    }
}

impl<P: Problem> Engine<P> {
    /// Create an engine and seed its frontier from `problem.seeds()`.
    ///
    /// Seeds are classified like any other candidate: complete seeds go
    /// straight to the solution sink, invalid ones are dropped.
    pub fn new(problem: P, config: EngineConfig) -> Result<Self, EngineError> {
        let problem = Arc::new(problem);
        let frontier = Arc::new(Frontier::new());
        let solutions = Arc::new(SolutionSink::new());
        let mut seed_solved = false;

        let seeds = problem.seeds();
        let total = seeds.len();
        let mut kept = Vec::with_capacity(total);
        for seed in seeds {
            match classify(&*problem, &seed)? {
                Verdict::Accepted => {
                    if !(config.greedy && seed_solved) {
                        solutions.push(seed);
                    }
                    seed_solved = true;
                }
                Verdict::Valid => kept.push(seed),
                Verdict::Rejected => debug!(seed = ?seed, "dropping invalid seed"),
            }
        }
        debug!(seeds = total, kept = kept.len(), "frontier seeded");
        frontier.push_all(kept);

        Ok(Self {
            problem,
            config,
            frontier,
            solutions,
            seed_solved,
            pool: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    /// Pending partial solutions, shared with the workers.
    pub fn frontier(&self) -> &Arc<Frontier<P::Choice>> {
        &self.frontier
    }

    /// Accepted solutions, shared with the workers.
    pub fn solutions(&self) -> &Arc<SolutionSink<P::Choice>> {
        &self.solutions
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// Size of the current pool, or zero when idle.
    pub fn worker_count(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.handles.len())
    }

    /// Spawn exactly `num_workers` workers over the shared frontier and sink.
    pub fn start(&mut self, num_workers: usize) -> Result<(), EngineError> {
        if self.pool.is_some() {
            return Err(ConfigError::AlreadyRunning.into());
        }
        if num_workers == 0 {
            return Err(ConfigError::NoWorkers.into());
        }

        let (coordinator, worker_channels) = create_channels(num_workers);
        if self.config.greedy && self.seed_solved {
            // A seed already answered the search
            coordinator.shared.try_claim_solution();
            coordinator.shared.signal_stop();
        }
        let participants = self.frontier.open_session(num_workers);

        info!(
            workers = num_workers,
            frontier = self.frontier.len(),
            greedy = self.config.greedy,
            mode = %self.config.frontier_mode,
            "starting search"
        );

        let mut pool = WorkerPool {
            channels: coordinator,
            handles: Vec::with_capacity(num_workers),
            summaries: vec![None; num_workers],
            error: None,
            started: Instant::now(),
        };

        for (worker_id, (channels, participant)) in
            worker_channels.into_iter().zip(participants).enumerate()
        {
            // Stagger spawns so workers don't all hit the frontier lock at once
            if worker_id > 0 && !self.config.spawn_stagger.is_zero() {
                thread::sleep(self.config.spawn_stagger);
            }

            let worker = Worker {
                id: worker_id,
                problem: Arc::clone(&self.problem),
                frontier: Arc::clone(&self.frontier),
                solutions: Arc::clone(&self.solutions),
                participant,
                channels,
                mode: self.config.frontier_mode,
                greedy: self.config.greedy,
                stats: WorkerStats::default(),
                paused: false,
            };

            let spawned = thread::Builder::new()
                .name(format!("backtrack-worker-{worker_id}"))
                .spawn(move || worker.run_to_completion());

            match spawned {
                Ok(handle) => pool.handles.push(Some(handle)),
                Err(source) => {
                    warn!(worker_id, %source, "failed to spawn worker");
                    pool.terminate_all(&self.frontier);
                    for handle in pool.handles.iter_mut().filter_map(Option::take) {
                        let _ = handle.join();
                    }
                    return Err(ConfigError::Spawn { worker_id, source }.into());
                }
            }
        }

        self.pool = Some(pool);
        Ok(())
    }

    /// Deliver `message` to every worker. Returns how many workers received it.
    pub fn broadcast(&self, message: ControlMessage) -> usize {
        let Some(pool) = &self.pool else {
            return 0;
        };
        let delivered = pool.channels.broadcast(message);
        self.frontier.interrupt();
        debug!(?message, delivered, "broadcast");
        delivered
    }

    /// Deliver `message` to one worker.
    pub fn send(&self, worker_id: usize, message: ControlMessage) -> Result<(), EngineError> {
        let pool_size = self.worker_count();
        let tx = self
            .pool
            .as_ref()
            .and_then(|pool| pool.channels.to_workers.get(worker_id))
            .ok_or(ConfigError::UnknownWorker {
                worker_id,
                pool_size,
            })?;

        // A worker that already exited has nothing left to act on
        let _ = tx.send(message);
        self.frontier.interrupt();
        Ok(())
    }

    /// Ask every live worker for its statistics and wait up to `timeout` for answers.
    ///
    /// Paused workers answer too. Workers that finish while the probe is in
    /// flight are recorded and simply don't answer.
    pub fn probe(&mut self, timeout: Duration) -> Vec<ProbeAck> {
        let Some(pool) = self.pool.as_mut() else {
            return Vec::new();
        };
        pool.channels.broadcast(ControlMessage::Probe);
        self.frontier.interrupt();

        let deadline = Instant::now() + timeout;
        let mut acks: Vec<ProbeAck> = Vec::new();
        loop {
            let waiting = (0..pool.handles.len())
                .filter(|&id| pool.is_live(id) && !acks.iter().any(|a| a.worker_id == id))
                .count();
            if waiting == 0 {
                break;
            }
            match pool.channels.from_workers.recv_deadline(deadline) {
                Ok(event) => {
                    if let Some(ack) = pool.record(event, &self.frontier) {
                        acks.push(ack);
                    }
                }
                Err(_) => break,
            }
        }

        acks.sort_by_key(|ack| ack.worker_id);
        acks
    }

    /// Block until every worker has reached a terminal state.
    ///
    /// If any worker fails, the rest of the pool is stopped and the first
    /// error is returned. Joining an idle engine is a no-op.
    pub fn join(&mut self) -> Result<SearchReport, EngineError> {
        let Some(mut pool) = self.pool.take() else {
            return Ok(SearchReport::default());
        };
        pool.collect(&self.frontier, None);
        self.finish(pool)
    }

    /// Like `join`, but gives up after `timeout`. `Ok(None)` means the pool is
    /// still running.
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<Option<SearchReport>, EngineError> {
        let Some(pool) = self.pool.as_mut() else {
            return Ok(Some(SearchReport::default()));
        };
        if !pool.collect(&self.frontier, Some(Instant::now() + timeout)) {
            return Ok(None);
        }
        match self.pool.take() {
            Some(pool) => self.finish(pool).map(Some),
            None => Ok(Some(SearchReport::default())),
        }
    }

    /// Terminate every worker.
    ///
    /// Workers that don't exit within `config.stop_grace` are detached: they
    /// still leave at their next checkpoint but are no longer waited for.
    /// Stopping an idle engine is a no-op.
    pub fn stop(&mut self) -> Result<SearchReport, EngineError> {
        let Some(mut pool) = self.pool.take() else {
            return Ok(SearchReport::default());
        };
        pool.terminate_all(&self.frontier);
        pool.collect(&self.frontier, Some(Instant::now() + self.config.stop_grace));

        for worker_id in 0..pool.summaries.len() {
            if pool.summaries[worker_id].is_none() {
                warn!(worker_id, grace = ?self.config.stop_grace, "worker did not stop in time, detaching");
                pool.summaries[worker_id] = Some(WorkerSummary {
                    worker_id,
                    exit: WorkerExit::Detached,
                    stats: WorkerStats::default(),
                });
                // Dropping the handle detaches the thread
                pool.handles[worker_id] = None;
            }
        }
        self.finish(pool)
    }

    fn finish(&mut self, mut pool: WorkerPool) -> Result<SearchReport, EngineError> {
        for (worker_id, handle) in pool.handles.iter_mut().enumerate() {
            let Some(handle) = handle.take() else {
                continue;
            };
            if handle.join().is_err() && pool.error.is_none() {
                pool.error = Some(EngineError::WorkerPanicked {
                    worker_id,
                    message: "worker thread panicked outside the search loop".to_string(),
                });
            }
        }

        let workers: Vec<WorkerSummary> = pool.summaries.into_iter().flatten().collect();
        let mut totals = WorkerStats::default();
        for summary in &workers {
            totals.merge(&summary.stats);
        }

        let statistics = SearchStatistics {
            elapsed_time: pool.started.elapsed(),
            workers: workers.len(),
            totals,
            frontier_peak: self.frontier.peak_len(),
            frontier_remaining: self.frontier.len(),
        };
        info!(
            elapsed = ?statistics.elapsed_time,
            expansions = totals.expansions,
            accepted = totals.accepted,
            remaining = statistics.frontier_remaining,
            "search session ended"
        );

        match pool.error {
            Some(error) => Err(error),
            None => Ok(SearchReport {
                statistics,
                workers,
            }),
        }
    }
}

impl<P: Problem> Drop for Engine<P> {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.terminate_all(&self.frontier);
        }
    }
}

/// Solutions and report from a search run to completion.
#[derive(Debug)]
pub struct SearchOutcome<C> {
    pub solutions: Vec<PartialSolution<C>>,
    pub report: SearchReport,
}

/// Seed, run and join a search in one call.
pub fn run_search<P: Problem>(
    problem: P,
    config: EngineConfig,
    num_workers: usize,
) -> Result<SearchOutcome<P::Choice>, EngineError> {
    let mut engine = Engine::new(problem, config)?;
    engine.start(num_workers)?;
    let report = engine.join()?;
    Ok(SearchOutcome {
        solutions: engine.solutions().drain(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BoxError, Callback};
    use crate::problem::FnProblem;
    use std::collections::BTreeSet;

    fn choose_two_of_four() -> FnProblem<u8> {
        FnProblem::builder()
            .successors(|p: &[u8]| {
                Ok(if p.len() < 2 {
                    (1..=4).filter(|c| !p.contains(c)).collect()
                } else {
                    vec![]
                })
            })
            .is_valid(|_| Ok(true))
            .is_complete(|p: &[u8]| Ok(p.len() == 2))
            .build()
            .unwrap()
    }

    fn quick_config() -> EngineConfig {
        EngineConfig::default().with_spawn_stagger(Duration::ZERO)
    }

    #[test]
    fn test_start_rejects_zero_workers() {
        let mut engine = Engine::new(choose_two_of_four(), quick_config()).unwrap();
        let err = engine.start(0).unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::NoWorkers)));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_start_twice_is_an_error() {
        let mut engine = Engine::new(choose_two_of_four(), quick_config()).unwrap();
        engine.start(1).unwrap();
        let err = engine.start(1).unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::AlreadyRunning)));
        engine.join().unwrap();
    }

    #[test]
    fn test_join_collects_all_pairs() {
        let mut engine = Engine::new(choose_two_of_four(), quick_config()).unwrap();
        engine.start(3).unwrap();
        assert_eq!(engine.worker_count(), 3);

        let report = engine.join().unwrap();
        assert!(report.exhausted());
        assert_eq!(report.workers.len(), 3);
        assert_eq!(report.statistics.totals.accepted, 12);

        let solutions: BTreeSet<Vec<u8>> = engine
            .solutions()
            .drain()
            .into_iter()
            .map(PartialSolution::into_vec)
            .collect();
        assert_eq!(solutions.len(), 12);
        assert!(engine.frontier().is_empty());
    }

    #[test]
    fn test_stop_and_join_are_idempotent() {
        let mut engine = Engine::new(choose_two_of_four(), quick_config()).unwrap();
        assert!(engine.stop().unwrap().workers.is_empty());
        assert!(engine.join().unwrap().workers.is_empty());

        engine.start(2).unwrap();
        engine.join().unwrap();
        assert!(engine.stop().unwrap().workers.is_empty());
        assert!(engine.join().unwrap().workers.is_empty());
    }

    #[test]
    fn test_send_to_unknown_worker() {
        let mut engine = Engine::new(choose_two_of_four(), quick_config()).unwrap();
        assert!(matches!(
            engine.send(0, ControlMessage::Probe),
            Err(EngineError::Config(ConfigError::UnknownWorker { pool_size: 0, .. }))
        ));

        engine.start(2).unwrap();
        assert!(matches!(
            engine.send(5, ControlMessage::Probe),
            Err(EngineError::Config(ConfigError::UnknownWorker {
                worker_id: 5,
                pool_size: 2
            }))
        ));
        engine.join().unwrap();
    }

    #[test]
    fn test_invalid_seeds_are_dropped() {
        let problem = FnProblem::builder()
            .successors(|_: &[u8]| Ok(vec![]))
            .is_valid(|p: &[u8]| Ok(p.first() != Some(&0)))
            .is_complete(|p: &[u8]| Ok(p.len() == 2))
            .seeds(vec![
                PartialSolution::from(vec![0]),
                PartialSolution::from(vec![1]),
                PartialSolution::from(vec![1, 2]),
            ])
            .build()
            .unwrap();

        let engine = Engine::new(problem, quick_config()).unwrap();
        assert_eq!(engine.frontier().snapshot(), vec![PartialSolution::from(vec![1])]);
        assert_eq!(
            engine.solutions().drain(),
            vec![PartialSolution::from(vec![1, 2])]
        );
    }

    #[test]
    fn test_seed_callback_error_fails_construction() {
        let problem = FnProblem::builder()
            .successors(|_: &[u8]| Ok(vec![]))
            .is_valid(|_: &[u8]| Ok(true))
            .is_complete(|_: &[u8]| Err::<bool, BoxError>("cannot judge".into()))
            .build()
            .unwrap();

        match Engine::new(problem, quick_config()) {
            Err(err) => assert_eq!(err.failed_callback(), Some(Callback::IsComplete)),
            Ok(_) => panic!("seeding should have failed"),
        }
    }

    #[test]
    fn test_join_timeout_on_idle_engine() {
        let mut engine = Engine::new(choose_two_of_four(), quick_config()).unwrap();
        let report = engine.join_timeout(Duration::from_millis(10)).unwrap();
        assert!(report.is_some());
    }

    #[test]
    fn test_run_search_convenience() {
        let outcome = run_search(choose_two_of_four(), quick_config(), 2).unwrap();
        assert_eq!(outcome.solutions.len(), 12);
        assert_eq!(outcome.report.statistics.workers, 2);
    }
}
