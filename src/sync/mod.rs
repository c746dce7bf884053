pub mod ricart_agrawala;

use anyhow::Result;
use std::sync::{Arc, Barrier};

pub use ricart_agrawala::{Peer, PeerState, Phase, RoundReport};

/// Global synchronization point between rounds.
///
/// `rendezvous()` blocks until every participating peer has called it for the current round,
/// then releases all of them. There is no timeout: a peer that never arrives blocks everyone.
pub trait RoundBarrier {
    fn rendezvous(&mut self) -> Result<()>;
}

// In-process peers share one barrier sized to the number of peers
impl RoundBarrier for Arc<Barrier> {
    fn rendezvous(&mut self) -> Result<()> {
        self.wait();
        Ok(())
    }
}
