//! Control and event channels between the orchestrator and its workers.

use crate::error::EngineError;
use crate::search::result::{WorkerExit, WorkerStats};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Out-of-band signal delivered to a worker's mailbox.
///
/// Workers only read their mailbox at the top of the search loop, so acting
/// on a message never interrupts an expansion halfway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Leave the search loop.
    Terminate,
    /// Stop taking work until `Resume` or `Terminate` arrives.
    Pause,
    /// Continue after a `Pause`.
    Resume,
    /// Report current statistics with a `ProbeAck`.
    Probe,
}

/// Message sent from workers to the orchestrator.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Answer to a `Probe`.
    ProbeAck {
        worker_id: usize,
        paused: bool,
        stats: WorkerStats,
    },
    /// Worker has left its search loop normally.
    Finished {
        worker_id: usize,
        exit: WorkerExit,
        stats: WorkerStats,
    },
    /// Worker hit a callback error or panicked.
    Failed {
        worker_id: usize,
        error: EngineError,
        stats: WorkerStats,
    },
}

/// Probe answer collected by [`Engine::probe`](crate::search::Engine::probe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeAck {
    pub worker_id: usize,
    pub paused: bool,
    pub stats: WorkerStats,
}

/// Session-wide flags every worker checks at its checkpoint.
#[derive(Debug, Default)]
pub struct SharedSignal {
    should_stop: AtomicBool,
    solution_claimed: AtomicBool,
}

impl SharedSignal {
    /// Check if we should stop searching.
    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    /// Signal all workers to stop.
    pub fn signal_stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    /// Claim the single greedy-mode solution slot. Returns true for the first caller only.
    pub fn try_claim_solution(&self) -> bool {
        self.solution_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Channel endpoints for a worker.
pub struct WorkerChannels {
    /// Send events to the orchestrator.
    pub to_coordinator: Sender<WorkerEvent>,
    /// This worker's mailbox.
    pub mailbox: Receiver<ControlMessage>,
    /// Shared state for fast stop checks.
    pub shared: Arc<SharedSignal>,
}

impl WorkerChannels {
    /// Non-blocking mailbox poll. A disconnected mailbox means the
    /// orchestrator is gone and reads as `Terminate`.
    pub fn try_receive(&self) -> Option<ControlMessage> {
        match self.mailbox.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(ControlMessage::Terminate),
        }
    }

    /// Mailbox read used while paused. `None` on timeout.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<ControlMessage> {
        match self.mailbox.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(ControlMessage::Terminate),
        }
    }
}

/// Channel endpoints for the orchestrator.
pub struct CoordinatorChannels {
    /// Receive events from workers.
    pub from_workers: Receiver<WorkerEvent>,
    /// One mailbox sender per worker, indexed by worker id.
    pub to_workers: Vec<Sender<ControlMessage>>,
    /// Shared state.
    pub shared: Arc<SharedSignal>,
}

impl CoordinatorChannels {
    /// Deliver `message` to every worker. Returns how many mailboxes accepted it.
    pub fn broadcast(&self, message: ControlMessage) -> usize {
        if message == ControlMessage::Terminate {
            self.shared.signal_stop();
        }
        self.to_workers
            .iter()
            .filter(|tx| tx.send(message).is_ok())
            .count()
    }
}

/// Create channels for a pool of `num_workers` workers.
pub fn create_channels(num_workers: usize) -> (CoordinatorChannels, Vec<WorkerChannels>) {
    let shared = Arc::new(SharedSignal::default());

    // Unbounded in both directions: neither side may block on a send
    let (worker_tx, coordinator_rx) = unbounded();

    let mut to_workers = Vec::with_capacity(num_workers);
    let mut worker_channels = Vec::with_capacity(num_workers);

    for _ in 0..num_workers {
        let (coord_tx, worker_rx) = unbounded();
        to_workers.push(coord_tx);
        worker_channels.push(WorkerChannels {
            to_coordinator: worker_tx.clone(),
            mailbox: worker_rx,
            shared: Arc::clone(&shared),
        });
    }

    let coordinator = CoordinatorChannels {
        from_workers: coordinator_rx,
        to_workers,
        shared,
    };

    (coordinator, worker_channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_stop_signal() {
        let shared = SharedSignal::default();

        assert!(!shared.should_stop());
        shared.signal_stop();
        assert!(shared.should_stop());
    }

    #[test]
    fn test_solution_claimed_once() {
        let shared = SharedSignal::default();

        assert!(shared.try_claim_solution());
        assert!(!shared.try_claim_solution());
        assert!(!shared.try_claim_solution());
    }

    #[test]
    fn test_create_channels() {
        let (coordinator, workers) = create_channels(4);

        assert_eq!(workers.len(), 4);
        assert_eq!(coordinator.to_workers.len(), 4);

        workers[0]
            .to_coordinator
            .send(WorkerEvent::Finished {
                worker_id: 0,
                exit: WorkerExit::Drained,
                stats: WorkerStats::default(),
            })
            .unwrap();

        match coordinator.from_workers.recv().unwrap() {
            WorkerEvent::Finished {
                worker_id, exit, ..
            } => {
                assert_eq!(worker_id, 0);
                assert_eq!(exit, WorkerExit::Drained);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_point_to_point_delivery() {
        let (coordinator, workers) = create_channels(3);

        coordinator.to_workers[1].send(ControlMessage::Pause).unwrap();

        assert_eq!(workers[0].try_receive(), None);
        assert_eq!(workers[1].try_receive(), Some(ControlMessage::Pause));
        assert_eq!(workers[2].try_receive(), None);
        assert_eq!(workers[2].receive_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_broadcast_terminate_sets_stop() {
        let (coordinator, workers) = create_channels(2);

        assert_eq!(coordinator.broadcast(ControlMessage::Terminate), 2);
        assert!(coordinator.shared.should_stop());

        // All workers should receive it
        for (i, worker) in workers.iter().enumerate() {
            assert_eq!(
                worker.try_receive(),
                Some(ControlMessage::Terminate),
                "Worker {} missed the broadcast",
                i
            );
        }
    }

    #[test]
    fn test_disconnected_mailbox_reads_as_terminate() {
        let (coordinator, workers) = create_channels(1);
        drop(coordinator);

        assert_eq!(workers[0].try_receive(), Some(ControlMessage::Terminate));
        assert_eq!(
            workers[0].receive_timeout(Duration::from_millis(10)),
            Some(ControlMessage::Terminate)
        );
    }
}
