//! Notification channel between the coordinator and the workers
//!
//! Every unit owns exactly one [`Inbox`] and consumes it from a single
//! thread, so an event is always handled to completion before the next one
//! is looked at. Any number of [`Mailbox`] clones can feed an inbox.
//! crossbeam keeps each sender's events in send order; there is no
//! ordering between different senders.
//!
//! Worker inboxes are unbounded so the coordinator never blocks on a
//! worker. The coordinator's inbox is bounded: a worker that reports
//! faster than the coordinator can record waits for room, which keeps the
//! token from running ahead of its own log.

use super::{WorkerId, WorkerState};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::fmt;
use std::time::Duration;

/// A successor as seen by a worker: its id plus a way to reach it
#[derive(Clone)]
pub struct Peer {
    /// Successor identity
    pub id: WorkerId,

    mailbox: Mailbox<WorkerEvent>,
}

impl Peer {
    /// Bundle a worker id with its mailbox
    pub fn new(id: WorkerId, mailbox: Mailbox<WorkerEvent>) -> Self {
        Self { id, mailbox }
    }

    /// Mailbox of this peer
    pub fn mailbox(&self) -> &Mailbox<WorkerEvent> {
        &self.mailbox
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Peer").field(&self.id).finish()
    }
}

/// Events delivered to a worker
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Your successor is now this peer (last delivered wins)
    SuccessorAssigned(Peer),

    /// You now hold the token with this value
    TokenArrived(i64),

    /// Stop without further work
    Shutdown,
}

/// Events delivered to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// A worker observed a successor assignment
    SuccessorAcknowledged { worker: WorkerId, successor: WorkerId },

    /// A worker is about to hand the token on
    TokenForwarded {
        from: WorkerId,
        to: WorkerId,
        received: i64,
        draw: i64,
        value: i64,
    },

    /// A worker drove the token negative and left the ring
    WorkerRetired { worker: WorkerId, token: i64 },

    /// A worker gave up waiting for its next event
    WorkerStalled { worker: WorkerId, state: WorkerState },
}

/// Why a bounded wait ended without an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// Nothing arrived within the bound
    Timeout,

    /// Every mailbox for this inbox has been dropped
    Closed,
}

/// Sending half of a notification channel
pub struct Mailbox<E> {
    sender: Sender<E>,
}

impl<E> Clone for Mailbox<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E> Mailbox<E> {
    /// Deliver an event, fire-and-forget
    ///
    /// Returns `false` if the receiving unit has already gone away.
    pub fn send(&self, event: E) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Deliver an event, waiting at most `timeout` for room in a bounded inbox
    pub fn send_timeout(&self, event: E, timeout: Duration) -> Result<(), WaitError> {
        self.sender.send_timeout(event, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(_) => WaitError::Timeout,
            SendTimeoutError::Disconnected(_) => WaitError::Closed,
        })
    }
}

/// Receiving half of a notification channel, owned by one unit
pub struct Inbox<E> {
    receiver: Receiver<E>,
}

impl<E> Inbox<E> {
    /// Block until the next event or until `timeout` expires
    pub fn recv_timeout(&self, timeout: Duration) -> Result<E, WaitError> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => WaitError::Timeout,
            RecvTimeoutError::Disconnected => WaitError::Closed,
        })
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Create a connected mailbox/inbox pair
pub fn channel<E>() -> (Mailbox<E>, Inbox<E>) {
    let (sender, receiver) = unbounded();
    (Mailbox { sender }, Inbox { receiver })
}

/// Create a mailbox/inbox pair that holds at most `capacity` queued events
pub fn bounded_channel<E>(capacity: usize) -> (Mailbox<E>, Inbox<E>) {
    let (sender, receiver) = bounded(capacity);
    (Mailbox { sender }, Inbox { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_sender_order() {
        let (mailbox, inbox) = channel::<WorkerEvent>();
        for value in [5, 3, 0] {
            assert!(mailbox.send(WorkerEvent::TokenArrived(value)));
        }
        assert_eq!(inbox.len(), 3);

        let received: Vec<i64> = std::iter::from_fn(|| inbox.try_recv())
            .map(|event| match event {
                WorkerEvent::TokenArrived(v) => v,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(received, vec![5, 3, 0]);
    }

    #[test]
    fn test_wait_timeout_and_close() {
        let (mailbox, inbox) = channel::<CoordinatorEvent>();
        assert_eq!(
            inbox.recv_timeout(Duration::from_millis(10)).unwrap_err(),
            WaitError::Timeout
        );

        drop(mailbox);
        assert_eq!(
            inbox.recv_timeout(Duration::from_millis(10)).unwrap_err(),
            WaitError::Closed
        );
    }

    #[test]
    fn test_send_to_dropped_inbox() {
        let (mailbox, inbox) = channel::<WorkerEvent>();
        drop(inbox);
        assert!(!mailbox.send(WorkerEvent::Shutdown));
    }

    #[test]
    fn test_bounded_send_waits_for_room() {
        let (mailbox, inbox) = bounded_channel::<WorkerEvent>(1);
        assert!(mailbox.send_timeout(WorkerEvent::TokenArrived(1), Duration::from_millis(10)).is_ok());
        assert_eq!(
            mailbox
                .send_timeout(WorkerEvent::TokenArrived(2), Duration::from_millis(10))
                .unwrap_err(),
            WaitError::Timeout
        );

        assert!(matches!(inbox.try_recv(), Some(WorkerEvent::TokenArrived(1))));
        assert!(mailbox.send_timeout(WorkerEvent::TokenArrived(3), Duration::from_millis(10)).is_ok());

        drop(inbox);
        assert_eq!(
            mailbox.send_timeout(WorkerEvent::Shutdown, Duration::from_millis(10)).unwrap_err(),
            WaitError::Closed
        );
    }

    #[test]
    fn test_peer_carries_mailbox() {
        let (mailbox, inbox) = channel::<WorkerEvent>();
        let peer = Peer::new(WorkerId::new(4), mailbox);
        assert!(peer.mailbox().send(WorkerEvent::TokenArrived(11)));
        assert!(matches!(inbox.try_recv(), Some(WorkerEvent::TokenArrived(11))));
        assert_eq!(format!("{:?}", peer), "Peer(WorkerId(4))");
    }
}
