//! The search worker: pop, expand, classify, repeat.
//!
//! Each iteration of the loop is
//! 1. checkpoint: check the session stop flag and drain the mailbox
//! 2. pop a partial solution from the frontier (the only suspension point)
//! 3. expand it with `successors`
//! 4. classify every child: accepted → sink, valid → frontier, else dropped
//!
//! Control signals are only acted on at step 1, so an expansion that has
//! been popped always runs to the end and nothing in flight is lost.

use crate::error::{Callback, EngineError};
use crate::problem::{PartialSolution, Problem};
use crate::search::parallel::channel::{ControlMessage, WorkerChannels, WorkerEvent};
use crate::search::parallel::config::FrontierMode;
use crate::search::parallel::frontier::{Frontier, Participant, Pop};
use crate::search::parallel::solutions::SolutionSink;
use crate::search::result::{WorkerExit, WorkerStats};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// How often a paused worker re-checks the session stop flag.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where a candidate extension goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Accepted,
    Valid,
    Rejected,
}

/// Acceptance first, then validity.
pub(crate) fn classify<P: Problem>(
    problem: &P,
    candidate: &PartialSolution<P::Choice>,
) -> Result<Verdict, EngineError> {
    let complete = problem
        .is_complete(candidate)
        .map_err(|e| EngineError::callback(Callback::IsComplete, candidate, e))?;
    if complete {
        return Ok(Verdict::Accepted);
    }

    let valid = problem
        .is_valid(candidate)
        .map_err(|e| EngineError::callback(Callback::IsValid, candidate, e))?;
    Ok(if valid {
        Verdict::Valid
    } else {
        Verdict::Rejected
    })
}

enum Step {
    Continue,
    Halt,
}

/// Everything a worker thread owns.
pub(crate) struct Worker<P: Problem> {
    pub(crate) id: usize,
    pub(crate) problem: Arc<P>,
    pub(crate) frontier: Arc<Frontier<P::Choice>>,
    pub(crate) solutions: Arc<SolutionSink<P::Choice>>,
    pub(crate) participant: Participant<P::Choice>,
    pub(crate) channels: WorkerChannels,
    pub(crate) mode: FrontierMode,
    pub(crate) greedy: bool,
    pub(crate) stats: WorkerStats,
    pub(crate) paused: bool,
}

impl<P: Problem> Worker<P> {
    /// Run the search loop and report the outcome to the orchestrator.
    pub(crate) fn run_to_completion(mut self) {
        let worker_id = self.id;
        debug!(worker_id, mode = %self.mode, greedy = self.greedy, "worker started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run()));
        let stats = self.stats;

        let event = match outcome {
            Ok(Ok(exit)) => {
                debug!(
                    worker_id,
                    %exit,
                    expansions = stats.expansions,
                    accepted = stats.accepted,
                    "worker finished"
                );
                WorkerEvent::Finished {
                    worker_id,
                    exit,
                    stats,
                }
            }
            Ok(Err(error)) => {
                warn!(worker_id, %error, "worker failed");
                self.halt_pool();
                WorkerEvent::Failed {
                    worker_id,
                    error,
                    stats,
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(worker_id, %message, "worker panicked");
                self.halt_pool();
                WorkerEvent::Failed {
                    worker_id,
                    error: EngineError::WorkerPanicked { worker_id, message },
                    stats,
                }
            }
        };

        let _ = self.channels.to_coordinator.send(event);
    }

    fn run(&mut self) -> Result<WorkerExit, EngineError> {
        loop {
            // Read before the mailbox so a signal sent in between still wakes the pop
            let epoch = self.frontier.epoch();
            if let Some(exit) = self.checkpoint() {
                return Ok(exit);
            }

            let partial = match self.pop(epoch) {
                Pop::Item(partial) => partial,
                Pop::Interrupted => continue,
                Pop::Empty => {
                    if let FrontierMode::Polling { backoff } = self.mode {
                        thread::sleep(backoff);
                    }
                    continue;
                }
                Pop::Drained => return Ok(WorkerExit::Drained),
            };

            if let Step::Halt = self.expand(partial)? {
                return Ok(WorkerExit::Stopped);
            }
        }
    }

    fn checkpoint(&mut self) -> Option<WorkerExit> {
        if self.channels.shared.should_stop() {
            return Some(WorkerExit::Stopped);
        }
        while let Some(message) = self.channels.try_receive() {
            if let Some(exit) = self.handle(message) {
                return Some(exit);
            }
        }
        None
    }

    fn handle(&mut self, message: ControlMessage) -> Option<WorkerExit> {
        match message {
            ControlMessage::Terminate => Some(WorkerExit::Stopped),
            ControlMessage::Probe => {
                self.ack_probe();
                None
            }
            ControlMessage::Resume => None,
            ControlMessage::Pause => self.pause(),
        }
    }

    /// Wait on the mailbox until resumed or stopped.
    fn pause(&mut self) -> Option<WorkerExit> {
        debug!(worker_id = self.id, "worker paused");
        self.paused = true;
        let exit = loop {
            if self.channels.shared.should_stop() {
                break Some(WorkerExit::Stopped);
            }
            match self.channels.receive_timeout(PAUSE_POLL_INTERVAL) {
                Some(ControlMessage::Terminate) => break Some(WorkerExit::Stopped),
                Some(ControlMessage::Resume) => break None,
                Some(ControlMessage::Probe) => self.ack_probe(),
                Some(ControlMessage::Pause) | None => {}
            }
        };
        self.paused = false;
        debug!(worker_id = self.id, "worker resumed");
        exit
    }

    fn ack_probe(&self) {
        let _ = self.channels.to_coordinator.send(WorkerEvent::ProbeAck {
            worker_id: self.id,
            paused: self.paused,
            stats: self.stats,
        });
    }

    fn pop(&mut self, epoch: u64) -> Pop<P::Choice> {
        match self.mode {
            FrontierMode::Blocking => self.participant.pop_blocking(epoch),
            FrontierMode::Polling { .. } => self.participant.poll(),
        }
    }

    fn expand(&mut self, partial: PartialSolution<P::Choice>) -> Result<Step, EngineError> {
        self.stats.expansions += 1;

        let choices = self
            .problem
            .successors(&partial)
            .map_err(|e| EngineError::callback(Callback::Successors, &partial, e))?;
        trace!(
            worker_id = self.id,
            depth = partial.depth(),
            choices = choices.len(),
            "expanding"
        );

        let mut children = Vec::with_capacity(choices.len());
        for choice in choices {
            let child = partial.child(choice);
            self.stats.candidates += 1;

            match classify(&*self.problem, &child)? {
                Verdict::Accepted => {
                    if self.accept(child) {
                        return Ok(Step::Halt);
                    }
                }
                Verdict::Valid => children.push(child),
                Verdict::Rejected => self.stats.pruned += 1,
            }
        }

        self.stats.pushed += children.len() as u64;
        self.frontier.push_all(children);
        Ok(Step::Continue)
    }

    /// Record a solution. Returns true if the worker should halt (greedy mode).
    fn accept(&mut self, solution: PartialSolution<P::Choice>) -> bool {
        if !self.greedy {
            self.stats.accepted += 1;
            self.solutions.push(solution);
            return false;
        }

        if self.channels.shared.try_claim_solution() {
            info!(worker_id = self.id, depth = solution.depth(), "greedy solution found");
            self.stats.accepted += 1;
            self.solutions.push(solution);
        }
        self.halt_pool();
        true
    }

    /// Tell every worker in the session to stop at its next checkpoint.
    fn halt_pool(&self) {
        self.channels.shared.signal_stop();
        self.frontier.interrupt();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::problem::FnProblem;

    fn pairs_problem() -> FnProblem<u8> {
        FnProblem::builder()
            .successors(|p: &[u8]| {
                Ok(if p.len() < 2 {
                    (1..=3).filter(|c| !p.contains(c)).collect()
                } else {
                    vec![]
                })
            })
            .is_valid(|p: &[u8]| Ok(p.first() != Some(&3)))
            .is_complete(|p: &[u8]| Ok(p.len() == 2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_classify_order() {
        let problem = pairs_problem();

        assert_eq!(
            classify(&problem, &PartialSolution::from(vec![1, 2])).unwrap(),
            Verdict::Accepted
        );
        // Acceptance is checked first, so an invalid prefix can still be complete
        assert_eq!(
            classify(&problem, &PartialSolution::from(vec![3, 1])).unwrap(),
            Verdict::Accepted
        );
        assert_eq!(
            classify(&problem, &PartialSolution::from(vec![1])).unwrap(),
            Verdict::Valid
        );
        assert_eq!(
            classify(&problem, &PartialSolution::from(vec![3])).unwrap(),
            Verdict::Rejected
        );
    }

    #[test]
    fn test_classify_names_failing_callback() {
        let problem = FnProblem::builder()
            .successors(|_: &[u8]| Ok(vec![]))
            .is_valid(|_: &[u8]| Err::<bool, BoxError>("validity exploded".into()))
            .is_complete(|_: &[u8]| Ok(false))
            .build()
            .unwrap();

        let err = classify(&problem, &PartialSolution::from(vec![4])).unwrap_err();
        assert_eq!(err.failed_callback(), Some(Callback::IsValid));
        assert!(err.to_string().contains("[4]"));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
