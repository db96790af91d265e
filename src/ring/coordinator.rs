//! Ring coordinator - owns membership and drives the run
//!
//! The coordinator is responsible for:
//! - Spawning the workers and recording them in ring order
//! - Broadcasting successor assignments and waiting for every acknowledgment
//! - Injecting the starting token at the head of the ring
//! - Repairing the ring after each retirement
//! - Detecting the winner and reaping every worker thread
//!
//! All of this happens on the caller's thread, reading one event at a time
//! from a single inbox, so repairs never interleave.

use super::channel::{bounded_channel, channel, CoordinatorEvent, Inbox, Mailbox, WaitError, WorkerEvent};
use super::membership::{RepairResult, Ring};
use super::token::SeededDraw;
use super::worker::{Launcher, ThreadLauncher, Worker, WorkerHandle, WorkerReport};
use super::WorkerId;
use crate::config::RingConfig;
use crate::error::{Result, RingError, WorkerError};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// How often blocked waits wake up to check the shutdown flag
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Worker reports the coordinator holds before senders have to wait
const INBOX_CAPACITY: usize = 64;

/// Poll interval while waiting for worker threads to exit
const REAP_INTERVAL: Duration = Duration::from_millis(10);

/// Something observable that happened during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingEvent {
    /// The coordinator handed the starting token to a worker
    TokenInjected { to: WorkerId, value: i64 },

    /// A worker received `received`, subtracted `draw` and passed `value` on
    TokenForwarded {
        from: WorkerId,
        to: WorkerId,
        received: i64,
        draw: i64,
        value: i64,
    },

    /// A worker left the ring; `remaining` is the ring size afterwards
    WorkerRetired {
        worker: WorkerId,
        token: i64,
        remaining: usize,
    },

    /// A predecessor was pointed at a new successor
    TopologyRepaired {
        predecessor: WorkerId,
        successor: WorkerId,
    },

    /// One worker is left
    WinnerDeclared { worker: WorkerId },
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A sole survivor was found
    Winner(WorkerId),

    /// The configured number of forwards happened first
    ForwardLimitReached,

    /// The shutdown flag was raised
    Interrupted,
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunResult {
    /// How the run ended
    pub outcome: RunOutcome,

    /// Seed the draws were derived from
    pub seed: u64,

    /// Number of forwards observed
    pub forwards: u64,

    /// Number of non-stale retirements processed
    pub repairs: u64,

    /// Everything that happened, in processing order
    pub events: Vec<RingEvent>,

    /// Final report of every worker that joined cleanly
    pub workers: Vec<WorkerReport>,

    /// Time taken for the run
    pub duration: Duration,
}

impl RunResult {
    /// The declared winner, if any
    pub fn winner(&self) -> Option<WorkerId> {
        match self.outcome {
            RunOutcome::Winner(id) => Some(id),
            _ => None,
        }
    }

    /// `(worker, reported token)` for every retirement, in order
    pub fn retirements(&self) -> Vec<(WorkerId, i64)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                RingEvent::WorkerRetired { worker, token, .. } => Some((worker, token)),
                _ => None,
            })
            .collect()
    }

    /// Every value the coordinator injected
    pub fn injections(&self) -> Vec<i64> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                RingEvent::TokenInjected { value, .. } => Some(value),
                _ => None,
            })
            .collect()
    }
}

type Observer = Box<dyn FnMut(&RingEvent)>;

/// Owns the ring and runs the retirement game to completion
pub struct Coordinator {
    /// Configuration
    config: RingConfig,

    /// Live membership in ring order
    ring: Ring,

    /// Every spawned worker, retired or not, until joined
    workers: BTreeMap<WorkerId, WorkerHandle>,

    /// Handed to every worker
    mailbox: Mailbox<CoordinatorEvent>,

    /// Single consumer of worker notifications
    inbox: Inbox<CoordinatorEvent>,

    /// Starts worker threads
    launcher: Box<dyn Launcher>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,

    /// Live event callback
    observer: Option<Observer>,

    /// Run log
    events: Vec<RingEvent>,

    forwards: u64,
    repairs: u64,
}

impl Coordinator {
    /// Create a coordinator that runs workers on OS threads
    pub fn new(config: RingConfig) -> Result<Self> {
        config.validate()?;
        let (mailbox, inbox) = bounded_channel(INBOX_CAPACITY);

        Ok(Self {
            ring: Ring::new(),
            config,
            workers: BTreeMap::new(),
            mailbox,
            inbox,
            launcher: Box::new(ThreadLauncher),
            shutdown: Arc::new(AtomicBool::new(false)),
            observer: None,
            events: Vec::new(),
            forwards: 0,
            repairs: 0,
        })
    }

    /// Use a different launcher for worker event loops
    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Call `observer` for every event as it is recorded
    pub fn on_event(mut self, observer: impl FnMut(&RingEvent) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Configuration in use
    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// Current membership
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    /// Events recorded so far
    pub fn events(&self) -> &[RingEvent] {
        &self.events
    }

    /// Run the ring until a winner, the forward limit, or an interrupt
    pub fn run(mut self) -> Result<RunResult> {
        let start_time = Instant::now();

        info!(
            workers = self.config.worker_count,
            max_decrement = self.config.max_decrement,
            initial_token = self.config.initial_token,
            seed = self.config.seed,
            "Starting token ring"
        );

        let outcome = match self.circulate() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Ring run aborted");
                self.shutdown_workers();
                self.ring = Ring::new();
                return Err(e);
            }
        };

        let workers = self.shutdown_workers();
        self.ring = Ring::new();

        let duration = start_time.elapsed();
        info!(
            outcome = ?outcome,
            forwards = self.forwards,
            repairs = self.repairs,
            duration_ms = duration.as_millis() as u64,
            "Ring run finished"
        );

        Ok(RunResult {
            outcome,
            seed: self.config.seed,
            forwards: self.forwards,
            repairs: self.repairs,
            events: std::mem::take(&mut self.events),
            workers,
            duration,
        })
    }

    fn circulate(&mut self) -> Result<RunOutcome> {
        self.spawn(self.config.worker_count)?;
        self.broadcast_topology()?;

        if self.shutdown.load(Ordering::Relaxed) {
            return Ok(RunOutcome::Interrupted);
        }

        let head = self.ring.head().ok_or(RingError::EmptyRing)?;
        self.inject(head)?;
        self.event_loop()
    }

    /// Create `count` workers and append them to the ring in spawn order
    ///
    /// On the first failure nothing is retried; the caller must tear down
    /// the workers that did start.
    pub fn spawn(&mut self, count: usize) -> Result<()> {
        let base = self.workers.len();

        for index in base..base + count {
            let id = WorkerId::new(index);
            let (mailbox, inbox) = channel();
            let draws = SeededDraw::for_worker(self.config.seed, index, self.config.max_decrement);
            let worker = Worker::new(
                id,
                Box::new(draws),
                self.mailbox.clone(),
                inbox,
                self.config.wait_timeout,
            );

            let handle = self.launcher.launch(worker).map_err(|e| {
                error!(index, error = %e, "Failed to spawn worker");
                WorkerError::SpawnFailed {
                    index,
                    reason: e.to_string(),
                }
            })?;

            self.ring.push(id);
            self.workers.insert(id, WorkerHandle::new(id, mailbox, handle));
        }

        info!(count = self.ring.len(), "Workers spawned");
        Ok(())
    }

    /// Send every member its successor and wait until all have acknowledged
    pub fn broadcast_topology(&mut self) -> Result<()> {
        let links: Vec<(WorkerId, WorkerId)> = self.ring.links().collect();
        let mut pending: HashMap<WorkerId, WorkerId> = HashMap::with_capacity(links.len());

        for (id, successor) in links {
            self.assign_successor(id, successor, "topology broadcast")?;
            pending.insert(id, successor);
        }

        let mut last_progress = Instant::now();
        while !pending.is_empty() {
            if self.shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }

            match self.inbox.recv_timeout(self.tick()) {
                Ok(CoordinatorEvent::SuccessorAcknowledged { worker, successor }) => {
                    if pending.get(&worker) == Some(&successor) {
                        pending.remove(&worker);
                        last_progress = Instant::now();
                    }
                }
                Ok(CoordinatorEvent::WorkerStalled { worker, state }) => {
                    error!(worker = %worker, state = ?state, "Worker stalled before the ring formed");
                    return Err(RingError::Liveness {
                        phase: "topology broadcast",
                        waited: self.config.wait_timeout,
                        worker: Some(worker),
                    });
                }
                Ok(other) => {
                    debug!(event = ?other, "Unexpected event before token injection");
                }
                Err(WaitError::Timeout) => {
                    let waited = last_progress.elapsed();
                    if waited >= self.config.wait_timeout {
                        let worker = pending.keys().min().copied();
                        error!(missing = pending.len(), "Successor acknowledgments never arrived");
                        return Err(RingError::Liveness {
                            phase: "topology broadcast",
                            waited,
                            worker,
                        });
                    }
                }
                Err(WaitError::Closed) => return Err(RingError::ChannelClosed),
            }
        }

        debug!(members = self.ring.len(), "Topology acknowledged by every worker");
        Ok(())
    }

    /// Remove a retiree and repair the ring around it
    ///
    /// `reported` is the negative token the retiree carried; it is only
    /// logged. Unknown ids are a no-op.
    pub fn remove(&mut self, retiree: WorkerId, reported: i64) -> Result<RepairResult> {
        let result = self.ring.remove(retiree);

        match result {
            RepairResult::Stale => {
                debug!(worker = %retiree, "Retirement for a worker no longer in the ring");
            }
            RepairResult::Winner(winner) => {
                self.repairs += 1;
                self.record_retirement(retiree, reported);
                info!(worker = %winner, "Winner detected");
                self.record(RingEvent::WinnerDeclared { worker: winner });
            }
            RepairResult::Rewired {
                predecessor,
                successor,
                head,
            } => {
                self.repairs += 1;
                self.record_retirement(retiree, reported);
                self.assign_successor(predecessor, successor, "ring repair")?;
                self.record(RingEvent::TopologyRepaired {
                    predecessor,
                    successor,
                });
                self.inject(head)?;
            }
            RepairResult::Emptied => {
                self.record_retirement(retiree, reported);
                return Err(RingError::EmptyRing);
            }
        }

        Ok(result)
    }

    /// Tell every live worker to stop and join all worker threads
    ///
    /// Reports still queued in the inbox are discarded while waiting, so a
    /// worker blocked on a full inbox can reach its shutdown message.
    pub fn shutdown_workers(&mut self) -> Vec<WorkerReport> {
        for handle in self.workers.values() {
            // Retired workers have already dropped their inbox
            handle.send(WorkerEvent::Shutdown);
        }

        let mut running = std::mem::take(&mut self.workers);
        let mut reports = Vec::with_capacity(running.len());
        while !running.is_empty() {
            let finished: Vec<WorkerId> = running
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(&id, _)| id)
                .collect();

            for id in finished {
                let Some(handle) = running.remove(&id) else {
                    continue;
                };
                match handle.join() {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!(worker = %id, error = %e, "Worker failed to join cleanly"),
                }
            }

            if running.is_empty() {
                break;
            }
            match self.inbox.recv_timeout(REAP_INTERVAL) {
                Ok(event) => trace!(event = ?event, "Discarding report during shutdown"),
                Err(WaitError::Timeout) => {}
                Err(WaitError::Closed) => thread::sleep(REAP_INTERVAL),
            }
        }

        reports.sort_by_key(|report| report.id);
        debug!(joined = reports.len(), "Workers reaped");
        reports
    }

    fn event_loop(&mut self) -> Result<RunOutcome> {
        let mut last_event = Instant::now();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received");
                return Ok(RunOutcome::Interrupted);
            }

            let event = match self.inbox.recv_timeout(self.tick()) {
                Ok(event) => event,
                Err(WaitError::Timeout) => {
                    let waited = last_event.elapsed();
                    if waited >= self.config.wait_timeout {
                        error!(waited_ms = waited.as_millis() as u64, "Token stopped circulating");
                        return Err(RingError::Liveness {
                            phase: "token circulation",
                            waited,
                            worker: None,
                        });
                    }
                    continue;
                }
                Err(WaitError::Closed) => return Err(RingError::ChannelClosed),
            };
            last_event = Instant::now();

            match event {
                CoordinatorEvent::SuccessorAcknowledged { worker, successor } => {
                    trace!(worker = %worker, successor = %successor, "Repair acknowledged");
                }
                CoordinatorEvent::TokenForwarded {
                    from,
                    to,
                    received,
                    draw,
                    value,
                } => {
                    if !self.ring.contains(from) {
                        trace!(worker = %from, "Forward from a worker no longer in the ring");
                        continue;
                    }
                    self.forwards += 1;
                    self.record(RingEvent::TokenForwarded {
                        from,
                        to,
                        received,
                        draw,
                        value,
                    });

                    if let Some(limit) = self.config.forward_limit {
                        if self.forwards >= limit {
                            info!(limit, "Forward limit reached");
                            return Ok(RunOutcome::ForwardLimitReached);
                        }
                    }
                }
                CoordinatorEvent::WorkerRetired { worker, token } => {
                    if let RepairResult::Winner(winner) = self.remove(worker, token)? {
                        return Ok(RunOutcome::Winner(winner));
                    }
                }
                CoordinatorEvent::WorkerStalled { worker, state } => {
                    error!(worker = %worker, state = ?state, "Worker stalled");
                    return Err(RingError::Liveness {
                        phase: "token circulation",
                        waited: self.config.wait_timeout,
                        worker: Some(worker),
                    });
                }
            }
        }
    }

    fn assign_successor(&self, worker: WorkerId, successor: WorkerId, phase: &'static str) -> Result<()> {
        let peer = self
            .workers
            .get(&successor)
            .map(WorkerHandle::peer)
            .ok_or(RingError::Unreachable {
                phase,
                worker: successor,
            })?;

        debug!(worker = %worker, successor = %successor, "Assigning successor");
        self.deliver(worker, WorkerEvent::SuccessorAssigned(peer), phase)
    }

    /// Hand the canonical starting token to `to`
    fn inject(&mut self, to: WorkerId) -> Result<()> {
        let value = self.config.initial_token;

        debug!(worker = %to, token = value, "Injecting token");
        self.deliver(to, WorkerEvent::TokenArrived(value), "token injection")?;
        self.record(RingEvent::TokenInjected { to, value });
        Ok(())
    }

    /// Send to a live member; a member whose inbox is gone has stalled the ring
    fn deliver(&self, worker: WorkerId, event: WorkerEvent, phase: &'static str) -> Result<()> {
        let delivered = self
            .workers
            .get(&worker)
            .is_some_and(|handle| handle.send(event));
        if !delivered {
            error!(worker = %worker, phase, "Member is no longer reachable");
            return Err(RingError::Unreachable { phase, worker });
        }
        Ok(())
    }

    fn record_retirement(&mut self, worker: WorkerId, token: i64) {
        let remaining = self.ring.len();
        info!(worker = %worker, token, remaining, "Worker retired");
        self.record(RingEvent::WorkerRetired {
            worker,
            token,
            remaining,
        });
    }

    fn record(&mut self, event: RingEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
        self.events.push(event);
    }

    fn tick(&self) -> Duration {
        CHECK_INTERVAL.min(self.config.wait_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::WorkerState;

    fn config(workers: i64) -> RingConfig {
        RingConfig::new(workers, 3, 10)
            .unwrap()
            .with_seed(1)
            .with_wait_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_spawn_and_broadcast() {
        let mut coordinator = Coordinator::new(config(4)).unwrap();
        coordinator.spawn(4).unwrap();
        assert_eq!(coordinator.ring().len(), 4);
        assert!(coordinator.ring().is_well_formed());

        coordinator.broadcast_topology().unwrap();

        let reports = coordinator.shutdown_workers();
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.stats.successor_updates == 1));
        assert!(reports.iter().all(|r| r.stats.tokens_received == 0));
    }

    #[test]
    fn test_stale_remove_is_noop() {
        let mut coordinator = Coordinator::new(config(3)).unwrap();
        coordinator.spawn(3).unwrap();
        coordinator.broadcast_topology().unwrap();

        let ghost = WorkerId::new(42);
        assert_eq!(coordinator.remove(ghost, -1).unwrap(), RepairResult::Stale);
        assert_eq!(coordinator.remove(ghost, -1).unwrap(), RepairResult::Stale);
        assert_eq!(coordinator.ring().len(), 3);
        assert!(coordinator.events().is_empty());

        coordinator.shutdown_workers();
    }

    #[test]
    fn test_run_produces_winner() {
        let result = Coordinator::new(config(3)).unwrap().run().unwrap();
        let winner = result.winner().expect("winner declared");

        assert_eq!(result.repairs, 2);
        assert_eq!(result.retirements().len(), 2);
        assert!(result.retirements().iter().all(|&(id, token)| id != winner && token < 0));
        assert!(matches!(
            result.events.last(),
            Some(RingEvent::WinnerDeclared { worker }) if *worker == winner
        ));
        assert_eq!(result.workers.len(), 3);
    }

    #[test]
    fn test_observer_sees_every_event() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let result = Coordinator::new(config(2))
            .unwrap()
            .on_event(move |e| sink.borrow_mut().push(e.clone()))
            .run()
            .unwrap();

        assert_eq!(*seen.borrow(), result.events);
    }

    #[test]
    fn test_repair_to_exited_member_is_liveness_failure() {
        let mut coordinator = Coordinator::new(config(3)).unwrap();
        coordinator.spawn(3).unwrap();
        coordinator.broadcast_topology().unwrap();

        // worker-0 exits while it is still the predecessor of worker-1
        let gone = WorkerId::new(0);
        assert!(coordinator.workers[&gone].send(WorkerEvent::Shutdown));
        while !coordinator.workers[&gone].is_finished() {
            thread::sleep(Duration::from_millis(5));
        }

        let err = coordinator.remove(WorkerId::new(1), -1).unwrap_err();
        assert!(matches!(
            err,
            RingError::Unreachable {
                phase: "ring repair",
                worker
            } if worker == gone
        ));
        assert!(err.is_liveness());
        assert_eq!(err.exit_code(), 2);

        let reports = coordinator.shutdown_workers();
        assert_eq!(reports.len(), 3);
    }

    #[test]
    fn test_shutdown_drains_full_inbox() {
        let mut coordinator = Coordinator::new(config(2)).unwrap();
        coordinator.spawn(2).unwrap();
        coordinator.broadcast_topology().unwrap();

        // Fill the inbox so a worker report would block
        for _ in 0..INBOX_CAPACITY {
            assert!(coordinator.mailbox.send(CoordinatorEvent::SuccessorAcknowledged {
                worker: WorkerId::new(0),
                successor: WorkerId::new(1),
            }));
        }
        assert_eq!(coordinator.inbox.len(), INBOX_CAPACITY);

        // worker-0 now blocks reporting the forward until the inbox drains
        assert!(coordinator.workers[&WorkerId::new(0)].send(WorkerEvent::TokenArrived(10)));

        let reports = coordinator.shutdown_workers();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.final_state == WorkerState::Stopped));
    }

    #[test]
    fn test_interrupt_before_start() {
        let coordinator = Coordinator::new(config(3)).unwrap();
        coordinator.shutdown_flag().store(true, Ordering::SeqCst);

        let result = coordinator.run().unwrap();
        assert_eq!(result.outcome, RunOutcome::Interrupted);
        assert!(result.events.is_empty());
        assert_eq!(result.workers.len(), 3);
    }
}
