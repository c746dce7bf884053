//! Point-to-point messaging between peers.
//!
//! Implementations must deliver reliably and in send order between any ordered pair of peers.
//! Nothing is promised about interleaving of messages from different sources.

pub mod channel;
pub mod tcp;

use crate::order::{PeerId, Request};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use channel::ChannelTransport;
pub use tcp::{TcpBarrier, TcpTransport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Reply,
    Release,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Request,
    Reply,
    Release,
}

impl Message {
    pub fn kind(&self) -> Kind {
        match self {
            Message::Request(_) => Kind::Request,
            Message::Reply => Kind::Reply,
            Message::Release => Kind::Release,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Request => "request",
            Kind::Reply => "reply",
            Kind::Release => "release",
        })
    }
}

/// A received message together with the peer that sent it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub source: PeerId,
    pub message: Message,
}

pub trait Transport {
    fn pid(&self) -> PeerId;
    fn n_peers(&self) -> usize;
    fn send_to(&mut self, to: PeerId, message: Message) -> Result<()>;
    // Blocks until a message from any peer arrives
    fn receive_any(&mut self) -> Result<Envelope>;

    fn broadcast(&mut self, message: Message) -> Result<()> {
        let me = self.pid();
        for to in (0..self.n_peers()).filter(|&to| to != me) {
            self.send_to(to, message)?;
        }
        Ok(())
    }
}
