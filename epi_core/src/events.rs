use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use epi_runtime::Stats;

use crate::handle::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    /// A round finished all its phases; `stats` is the new world total.
    RoundCompleted { round: u64, stats: Stats },
    /// No infectious people are left. Sent once, after the round's
    /// `RoundCompleted`.
    Completed { round: u64, stats: Stats },
    /// The simulation was abandoned; no further events follow.
    Failed { reason: String },
}

impl RoundEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RoundEvent::RoundCompleted { .. })
    }
}

/// Receiving end of a subscription. Holds at most one undelivered event:
/// the publisher waits until it is taken. Dropping it unsubscribes.
#[derive(Debug)]
pub struct RoundSubscription {
    receiver: Receiver<RoundEvent>,
}

impl RoundSubscription {
    /// Blocks for the next event; `None` once the publisher is gone.
    pub fn next(&self) -> Option<RoundEvent> {
        self.receiver.recv().ok()
    }

    pub fn try_next(&self) -> Option<RoundEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn next_timeout(&self, timeout: Duration) -> Result<RoundEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn iter(&self) -> impl Iterator<Item = RoundEvent> + '_ {
        self.receiver.iter()
    }
}

/// Fan-out point for round events. Cloning shares the subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<Sender<RoundEvent>>>>,
}

impl EventHub {
    pub fn subscribe(&self) -> RoundSubscription {
        let (sender, receiver) = bounded(1);
        lock(&self.subscribers).push(sender);
        RoundSubscription { receiver }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Hands `event` to every subscriber, waiting on each until its previous
    /// event was taken. Subscribers that went away are forgotten.
    pub fn publish(&self, event: RoundEvent) {
        let senders = lock(&self.subscribers).clone();
        let mut gone = Vec::new();
        for sender in &senders {
            if sender.send(event.clone()).is_err() {
                gone.push(sender.clone());
            }
        }
        if !gone.is_empty() {
            lock(&self.subscribers)
                .retain(|sender| !gone.iter().any(|dead| dead.same_channel(sender)));
            tracing::debug!(
                target: "epigrid::coordinator",
                dropped = gone.len(),
                "events.subscribers_dropped"
            );
        }
    }
}
