use super::{Envelope, Message, Transport};
use crate::order::PeerId;
use anyhow::{anyhow, ensure, Context, Result};
use std::sync::mpsc::{self, Receiver, Sender};

/// In-process transport: one inbox per peer, fed by a sender held by every peer.
pub struct ChannelTransport {
    i: PeerId,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
}

impl ChannelTransport {
    /// Fully connected mesh of `n_peers` endpoints, indexed by peer id.
    pub fn mesh(n_peers: usize) -> Vec<Self> {
        let (txs, rxs): (Vec<_>, Vec<_>) = (0..n_peers).map(|_| mpsc::channel()).unzip();
        rxs.into_iter()
            .enumerate()
            .map(|(i, inbox)| Self {
                i,
                peers: txs.clone(),
                inbox,
            })
            .collect()
    }
}

impl Transport for ChannelTransport {
    fn pid(&self) -> PeerId {
        self.i
    }
    fn n_peers(&self) -> usize {
        self.peers.len()
    }
    fn send_to(&mut self, to: PeerId, message: Message) -> Result<()> {
        ensure!(to != self.i, "peer {} cannot send to itself", self.i);
        let tx = self
            .peers
            .get(to)
            .ok_or_else(|| anyhow!("peer {} sending to unknown peer {to}", self.i))?;
        tx.send(Envelope {
            source: self.i,
            message,
        })
        .map_err(|_| anyhow!("inbox of peer {to} is closed"))
    }
    fn receive_any(&mut self) -> Result<Envelope> {
        self.inbox
            .recv()
            .with_context(|| format!("inbox of peer {} disconnected", self.i))
    }
}

#[cfg(test)]
mod tests {
    use crate::order::{LamportClock, Request};
    use crate::transport::{ChannelTransport, Envelope, Message, Transport};

    #[test]
    fn broadcast_skips_self() {
        let mut mesh = ChannelTransport::mesh(3);
        let req = Message::Request(Request::new(LamportClock(1), 1));
        mesh[1].broadcast(req).unwrap();

        for i in [0, 2] {
            assert_eq!(
                mesh[i].receive_any().unwrap(),
                Envelope {
                    source: 1,
                    message: req
                }
            );
        }
        assert!(mesh[1].inbox.try_recv().is_err());
    }

    #[test]
    fn fifo_per_sender() {
        let mut mesh = ChannelTransport::mesh(2);
        let (mut a, mut b) = {
            let b = mesh.pop().unwrap();
            (mesh.pop().unwrap(), b)
        };
        let th = std::thread::spawn(move || {
            a.send_to(1, Message::Reply).unwrap();
            a.send_to(1, Message::Release).unwrap();
            a.send_to(1, Message::Reply).unwrap();
            a
        });
        let kinds: Vec<_> = (0..3).map(|_| b.receive_any().unwrap().message).collect();
        assert_eq!(kinds, [Message::Reply, Message::Release, Message::Reply]);
        th.join().unwrap();
    }

    #[test]
    fn rejects_bad_destinations() {
        let mut mesh = ChannelTransport::mesh(2);
        assert!(mesh[0].send_to(0, Message::Reply).is_err());
        assert!(mesh[0].send_to(5, Message::Reply).is_err());
    }

    #[test]
    fn closed_inbox_is_an_error() {
        let mut mesh = ChannelTransport::mesh(2);
        let dropped = mesh.pop();
        drop(dropped);
        assert!(mesh[0].send_to(1, Message::Release).is_err());
    }
}
