use super::{HasEvents, LogicalClock, OrdProcess, PeerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar Lamport timestamp. Travels on the wire as a plain `int32`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LamportClock(pub i32);

impl LogicalClock for LamportClock {
    fn extend(&self) -> Self {
        Self(self.0 + 1)
    }
    fn merge(&self, other: &Self) -> Self {
        Self(self.0.max(other.0) + 1)
    }
}

impl fmt::Display for LamportClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub struct LamportProcess {
    i: PeerId,
    seed: LamportClock,
    events: Vec<LamportClock>,
}

impl LamportProcess {
    pub fn new(i: PeerId, seed: LamportClock) -> Self {
        Self {
            i,
            seed,
            events: Vec::new(),
        }
    }
}

impl HasEvents<LamportClock> for LamportProcess {
    fn last_event(&self) -> Option<&LamportClock> {
        self.events.last()
    }
    fn push_event(&mut self, e: LamportClock) {
        self.events.push(e)
    }
    fn pid(&self) -> PeerId {
        self.i
    }
    fn seed(&self) -> LamportClock {
        self.seed
    }
}

impl OrdProcess<LamportClock> for LamportProcess {
    fn snapshot(&self) -> &[LamportClock] {
        &self.events
    }
}
