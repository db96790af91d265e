//! Worker-side token circulation
//!
//! Each worker:
//! - Waits for its successor assignment from the coordinator
//! - Waits for the token
//! - Subtracts a draw from `[0, M]` and forwards the result, or retires
//!   when the result is negative
//!
//! A worker only ever touches its own successor and token. Every state
//! change happens inside [`Worker::handle`], one event at a time.

use super::channel::{CoordinatorEvent, Inbox, Mailbox, Peer, WaitError, WorkerEvent};
use super::token::{apply_draw, DecrementSource};
use super::WorkerId;
use crate::error::WorkerError;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Where a worker is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No successor known yet
    AwaitingSuccessor,

    /// Linked into the ring, not holding the token
    AwaitingToken,

    /// Drove the token negative and left the ring
    Retired,

    /// Told to stop by the coordinator
    Stopped,
}

impl WorkerState {
    /// Check if the worker loop has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Retired | WorkerState::Stopped)
    }
}

/// Per-worker counters, returned when the worker thread ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tokens received
    pub tokens_received: u64,

    /// Tokens handed to a successor
    pub tokens_forwarded: u64,

    /// Successor assignments observed
    pub successor_updates: u64,
}

/// Final report of a worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker identity
    pub id: WorkerId,

    /// State the loop ended in
    pub final_state: WorkerState,

    /// Counters
    pub stats: WorkerStats,
}

/// A ring member and its event loop
pub struct Worker {
    id: WorkerId,
    state: WorkerState,
    successor: Option<Peer>,
    draws: Box<dyn DecrementSource>,
    coordinator: Mailbox<CoordinatorEvent>,
    inbox: Inbox<WorkerEvent>,
    wait_timeout: Duration,
    stats: WorkerStats,
}

impl Worker {
    /// Create a worker in `AwaitingSuccessor`
    pub fn new(
        id: WorkerId,
        draws: Box<dyn DecrementSource>,
        coordinator: Mailbox<CoordinatorEvent>,
        inbox: Inbox<WorkerEvent>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            id,
            state: WorkerState::AwaitingSuccessor,
            successor: None,
            draws,
            coordinator,
            inbox,
            wait_timeout,
            stats: WorkerStats::default(),
        }
    }

    /// Worker ID
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Currently known successor
    pub fn successor(&self) -> Option<WorkerId> {
        self.successor.as_ref().map(|p| p.id)
    }

    /// Counters so far
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Handle a single event and return the resulting state
    pub fn handle(&mut self, event: WorkerEvent) -> Result<WorkerState, WorkerError> {
        if self.state.is_terminal() {
            trace!(worker = %self.id, ?event, "Event after termination ignored");
            return Ok(self.state);
        }

        match event {
            WorkerEvent::SuccessorAssigned(peer) => self.on_successor(peer)?,
            WorkerEvent::TokenArrived(value) => self.on_token(value)?,
            WorkerEvent::Shutdown => {
                debug!(worker = %self.id, "Shutdown received");
                self.state = WorkerState::Stopped;
            }
        }

        Ok(self.state)
    }

    fn on_successor(&mut self, peer: Peer) -> Result<(), WorkerError> {
        let successor = peer.id;
        debug!(worker = %self.id, successor = %successor, "Successor assigned");

        self.successor = Some(peer);
        self.stats.successor_updates += 1;
        if self.state == WorkerState::AwaitingSuccessor {
            self.state = WorkerState::AwaitingToken;
        }

        self.notify(CoordinatorEvent::SuccessorAcknowledged {
            worker: self.id,
            successor,
        })
    }

    fn on_token(&mut self, received: i64) -> Result<(), WorkerError> {
        self.stats.tokens_received += 1;

        let Some(successor) = self.successor.as_ref() else {
            return Err(WorkerError::TokenBeforeSuccessor { id: self.id });
        };

        let draw = self.draws.draw();
        let value = apply_draw(received, draw);
        trace!(worker = %self.id, received, draw, value, "Token decremented");

        if value < 0 {
            info!(worker = %self.id, token = value, "Token went negative, retiring");
            self.state = WorkerState::Retired;
            return self.notify(CoordinatorEvent::WorkerRetired {
                worker: self.id,
                token: value,
            });
        }

        // Report first so the coordinator's log stays causally ordered
        let to = successor.id;
        self.notify(CoordinatorEvent::TokenForwarded {
            from: self.id,
            to,
            received,
            draw,
            value,
        })?;

        if !successor.mailbox().send(WorkerEvent::TokenArrived(value)) {
            // Only happens once the ring is being torn down
            debug!(worker = %self.id, successor = %to, "Successor already gone, stopping");
            self.state = WorkerState::Stopped;
            return Ok(());
        }

        self.stats.tokens_forwarded += 1;
        self.state = WorkerState::AwaitingToken;
        Ok(())
    }

    /// Wait for the next event, bounded by the worker's wait timeout
    ///
    /// `None` means every mailbox for this worker is gone. A timeout is
    /// reported to the coordinator as a stall before it is returned.
    pub fn next_event(&self) -> Result<Option<WorkerEvent>, WorkerError> {
        match self.inbox.recv_timeout(self.wait_timeout) {
            Ok(event) => Ok(Some(event)),
            Err(WaitError::Closed) => Ok(None),
            Err(WaitError::Timeout) => {
                warn!(
                    worker = %self.id,
                    state = ?self.state,
                    waited_ms = self.wait_timeout.as_millis() as u64,
                    "No event within wait bound"
                );
                let stalled = CoordinatorEvent::WorkerStalled {
                    worker: self.id,
                    state: self.state,
                };
                // Best effort; the coordinator has its own bound
                let _ = self.coordinator.send_timeout(stalled, self.wait_timeout);
                Err(WorkerError::WaitTimeout {
                    id: self.id,
                    state: self.state,
                    waited: self.wait_timeout,
                })
            }
        }
    }

    /// Final report for the current state
    pub fn report(&self) -> WorkerReport {
        WorkerReport {
            id: self.id,
            final_state: self.state,
            stats: self.stats.clone(),
        }
    }

    /// Run the event loop until the worker retires or is stopped
    pub fn run(mut self) -> Result<WorkerReport, WorkerError> {
        debug!(worker = %self.id, "Worker starting");

        while !self.state.is_terminal() {
            match self.next_event()? {
                Some(event) => {
                    self.handle(event)?;
                }
                None => {
                    debug!(worker = %self.id, "Inbox closed, stopping");
                    self.state = WorkerState::Stopped;
                }
            }
        }

        debug!(
            worker = %self.id,
            state = ?self.state,
            received = self.stats.tokens_received,
            forwarded = self.stats.tokens_forwarded,
            "Worker finished"
        );

        Ok(self.report())
    }

    /// Report to the coordinator, waiting at most the wait timeout for room
    fn notify(&self, event: CoordinatorEvent) -> Result<(), WorkerError> {
        self.coordinator
            .send_timeout(event, self.wait_timeout)
            .map_err(|e| match e {
                WaitError::Timeout => WorkerError::WaitTimeout {
                    id: self.id,
                    state: self.state,
                    waited: self.wait_timeout,
                },
                WaitError::Closed => WorkerError::CoordinatorUnreachable { id: self.id },
            })
    }
}

/// Join handle of a running worker
pub type WorkerJoinHandle = JoinHandle<Result<WorkerReport, WorkerError>>;

/// Starts a worker's event loop on its own schedulable unit
pub trait Launcher {
    /// Start `worker` and return a handle to await it
    fn launch(&self, worker: Worker) -> io::Result<WorkerJoinHandle>;
}

/// Runs each worker on a named OS thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLauncher;

impl Launcher for ThreadLauncher {
    fn launch(&self, worker: Worker) -> io::Result<WorkerJoinHandle> {
        thread::Builder::new()
            .name(format!("ring-{}", worker.id().index()))
            .spawn(move || worker.run())
    }
}

/// Coordinator-side handle of a spawned worker
pub struct WorkerHandle {
    id: WorkerId,
    mailbox: Mailbox<WorkerEvent>,
    handle: Option<WorkerJoinHandle>,
}

impl WorkerHandle {
    /// Wrap a launched worker
    pub fn new(id: WorkerId, mailbox: Mailbox<WorkerEvent>, handle: WorkerJoinHandle) -> Self {
        Self {
            id,
            mailbox,
            handle: Some(handle),
        }
    }

    /// Peer record pointing at this worker
    pub fn peer(&self) -> Peer {
        Peer::new(self.id, self.mailbox.clone())
    }

    /// Deliver an event; `false` if the worker already exited
    pub fn send(&self, event: WorkerEvent) -> bool {
        self.mailbox.send(event)
    }

    /// Check if the worker's thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<WorkerReport, WorkerError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: "Worker thread panicked".into(),
                }),
            },
            None => Ok(WorkerReport {
                id: self.id,
                final_state: WorkerState::Stopped,
                stats: WorkerStats::default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::channel::{bounded_channel, channel};
    use std::collections::VecDeque;

    /// Replays a fixed list of draws
    struct Scripted(VecDeque<i64>);

    impl DecrementSource for Scripted {
        fn draw(&mut self) -> i64 {
            self.0.pop_front().unwrap_or(0)
        }
    }

    struct Fixture {
        worker: Worker,
        mailbox: Mailbox<WorkerEvent>,
        coordinator: Inbox<CoordinatorEvent>,
        successor: Inbox<WorkerEvent>,
        successor_peer: Peer,
    }

    fn fixture(draws: &[i64]) -> Fixture {
        let (coord_tx, coord_rx) = channel();
        let (tx, rx) = channel();
        let (succ_tx, succ_rx) = channel();
        let worker = Worker::new(
            WorkerId::new(0),
            Box::new(Scripted(draws.iter().copied().collect())),
            coord_tx,
            rx,
            Duration::from_millis(200),
        );
        Fixture {
            worker,
            mailbox: tx,
            coordinator: coord_rx,
            successor: succ_rx,
            successor_peer: Peer::new(WorkerId::new(1), succ_tx),
        }
    }

    #[test]
    fn test_successor_then_forward() {
        let mut f = fixture(&[2]);
        assert_eq!(f.worker.state(), WorkerState::AwaitingSuccessor);

        let state = f.worker.handle(WorkerEvent::SuccessorAssigned(f.successor_peer.clone())).unwrap();
        assert_eq!(state, WorkerState::AwaitingToken);
        assert_eq!(
            f.coordinator.try_recv(),
            Some(CoordinatorEvent::SuccessorAcknowledged {
                worker: WorkerId::new(0),
                successor: WorkerId::new(1),
            })
        );

        let state = f.worker.handle(WorkerEvent::TokenArrived(10)).unwrap();
        assert_eq!(state, WorkerState::AwaitingToken);
        assert_eq!(
            f.coordinator.try_recv(),
            Some(CoordinatorEvent::TokenForwarded {
                from: WorkerId::new(0),
                to: WorkerId::new(1),
                received: 10,
                draw: 2,
                value: 8,
            })
        );
        assert!(matches!(f.successor.try_recv(), Some(WorkerEvent::TokenArrived(8))));
        assert_eq!(f.worker.stats().tokens_forwarded, 1);
    }

    #[test]
    fn test_zero_is_forwarded() {
        let mut f = fixture(&[5]);
        f.worker.handle(WorkerEvent::SuccessorAssigned(f.successor_peer.clone())).unwrap();
        let state = f.worker.handle(WorkerEvent::TokenArrived(5)).unwrap();
        assert_eq!(state, WorkerState::AwaitingToken);
        assert!(matches!(f.successor.try_recv(), Some(WorkerEvent::TokenArrived(0))));
    }

    #[test]
    fn test_negative_retires() {
        let mut f = fixture(&[6]);
        f.worker.handle(WorkerEvent::SuccessorAssigned(f.successor_peer.clone())).unwrap();
        f.coordinator.try_recv();

        let state = f.worker.handle(WorkerEvent::TokenArrived(5)).unwrap();
        assert_eq!(state, WorkerState::Retired);
        assert_eq!(
            f.coordinator.try_recv(),
            Some(CoordinatorEvent::WorkerRetired {
                worker: WorkerId::new(0),
                token: -1,
            })
        );
        assert!(f.successor.is_empty());

        // terminal: later events are no-ops
        let state = f.worker.handle(WorkerEvent::TokenArrived(100)).unwrap();
        assert_eq!(state, WorkerState::Retired);
        assert_eq!(f.worker.stats().tokens_received, 1);
    }

    #[test]
    fn test_latest_successor_wins() {
        let mut f = fixture(&[1]);
        let (other_tx, other_rx) = channel();
        f.worker.handle(WorkerEvent::SuccessorAssigned(f.successor_peer.clone())).unwrap();
        f.worker
            .handle(WorkerEvent::SuccessorAssigned(Peer::new(WorkerId::new(7), other_tx)))
            .unwrap();
        assert_eq!(f.worker.successor(), Some(WorkerId::new(7)));
        assert_eq!(f.worker.stats().successor_updates, 2);

        f.worker.handle(WorkerEvent::TokenArrived(3)).unwrap();
        assert!(f.successor.is_empty());
        assert!(matches!(other_rx.try_recv(), Some(WorkerEvent::TokenArrived(2))));
    }

    #[test]
    fn test_missing_successor_stops_worker() {
        let mut f = fixture(&[1]);
        f.worker.handle(WorkerEvent::SuccessorAssigned(f.successor_peer.clone())).unwrap();
        drop(f.successor);

        let state = f.worker.handle(WorkerEvent::TokenArrived(4)).unwrap();
        assert_eq!(state, WorkerState::Stopped);
        assert_eq!(f.worker.stats().tokens_forwarded, 0);
    }

    #[test]
    fn test_full_coordinator_inbox_times_out() {
        let (coord_tx, coord_rx) = bounded_channel(1);
        let (_tx, rx) = channel();
        let (succ_tx, _succ_rx) = channel();
        let mut worker = Worker::new(
            WorkerId::new(0),
            Box::new(Scripted(VecDeque::new())),
            coord_tx,
            rx,
            Duration::from_millis(50),
        );

        // The acknowledgment fills the only slot
        worker
            .handle(WorkerEvent::SuccessorAssigned(Peer::new(WorkerId::new(1), succ_tx)))
            .unwrap();
        let err = worker.handle(WorkerEvent::TokenArrived(3)).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::WaitTimeout {
                state: WorkerState::AwaitingToken,
                ..
            }
        ));
        assert_eq!(coord_rx.len(), 1);
    }

    #[test]
    fn test_token_before_successor_is_error() {
        let mut f = fixture(&[0]);
        let err = f.worker.handle(WorkerEvent::TokenArrived(3)).unwrap_err();
        assert!(matches!(err, WorkerError::TokenBeforeSuccessor { .. }));
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let f = fixture(&[]);
        f.mailbox.send(WorkerEvent::SuccessorAssigned(f.successor_peer.clone()));
        f.mailbox.send(WorkerEvent::Shutdown);

        let report = f.worker.run().unwrap();
        assert_eq!(report.final_state, WorkerState::Stopped);
        assert_eq!(report.stats.successor_updates, 1);
    }

    #[test]
    fn test_run_times_out_waiting_for_successor() {
        let f = fixture(&[]);
        let coordinator = f.coordinator;
        let err = f.worker.run().unwrap_err();
        assert!(matches!(
            err,
            WorkerError::WaitTimeout {
                state: WorkerState::AwaitingSuccessor,
                ..
            }
        ));
        assert_eq!(
            coordinator.try_recv(),
            Some(CoordinatorEvent::WorkerStalled {
                worker: WorkerId::new(0),
                state: WorkerState::AwaitingSuccessor,
            })
        );
    }

    #[test]
    fn test_thread_launcher_joins() {
        let f = fixture(&[]);
        let id = f.worker.id();
        let handle = ThreadLauncher.launch(f.worker).unwrap();
        let handle = WorkerHandle::new(id, f.mailbox.clone(), handle);
        assert!(handle.send(WorkerEvent::Shutdown));
        let report = handle.join().unwrap();
        assert_eq!(report.final_state, WorkerState::Stopped);
    }

    #[test]
    fn test_handle_reports_finished() {
        let f = fixture(&[]);
        let id = f.worker.id();
        let handle = WorkerHandle::new(id, f.mailbox.clone(), ThreadLauncher.launch(f.worker).unwrap());
        assert!(handle.send(WorkerEvent::Shutdown));
        while !handle.is_finished() {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!handle.send(WorkerEvent::Shutdown));
        assert_eq!(handle.join().unwrap().final_state, WorkerState::Stopped);
    }
}
