pub mod lamport_clock;
pub mod pending_queue;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub use lamport_clock::{LamportClock, LamportProcess};
pub use pending_queue::PendingQueue;

pub type PeerId = usize;

// Ord because a single counter totally orders its own values
pub trait LogicalClock: Ord + Copy {
    fn extend(&self) -> Self;
    fn merge(&self, other: &Self) -> Self;
}

pub trait HasEvents<Event: LogicalClock> {
    fn last_event(&self) -> Option<&Event>;
    fn push_event(&mut self, e: Event);
    fn pid(&self) -> PeerId;
    // Clock value before the first event
    fn seed(&self) -> Event;
}

pub trait OrdProcess<Event>: HasEvents<Event>
where
    Event: LogicalClock,
{
    fn now(&self) -> Event {
        self.last_event().copied().unwrap_or_else(|| self.seed())
    }
    // Local event, e.g. originating a request
    fn advance_local(&mut self) -> Event {
        let e = self.now().extend();
        self.push_event(e);
        e
    }
    // Any message carrying a timestamp
    fn advance_on_receive(&mut self, remote: &Event) -> Event {
        let e = self.now().merge(remote);
        self.push_event(e);
        e
    }
    // Snapshot of event clocks occurred on process
    fn snapshot(&self) -> &[Event];
}

/// A claim on the critical section, stamped with the issuer's logical time.
///
/// Requests are totally ordered by `(timestamp, peer)`: equal timestamps are broken by the lower
/// peer id, which is unique per participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    pub timestamp: LamportClock,
    pub peer: PeerId,
}

impl Request {
    pub fn new(timestamp: LamportClock, peer: PeerId) -> Self {
        Self { timestamp, peer }
    }
}

impl Ord for Request {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.peer).cmp(&(other.timestamp, other.peer))
    }
}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
