//! Request/reply/release mutual exclusion over message passing.
//!
//! Every peer stamps a request with its Lamport clock, broadcasts it, and enters the critical
//! section once all other peers replied. Replies are sent immediately to every request, without
//! deferring lower-priority requesters. Exclusion between rounds comes from the round barrier
//! every peer crosses after its critical section: nobody starts round `r + 1` before everybody
//! finished round `r`. Critical sections within the same round are not ordered against each
//! other.

use super::RoundBarrier;
use crate::order::{
    HasEvents, LamportClock, LamportProcess, OrdProcess, PeerId, PendingQueue, Request,
};
use crate::transport::{Envelope, Message, Transport};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Requesting,
    AwaitingReplies,
    InCriticalSection,
    Releasing,
}

/// Protocol state owned by a single peer.
pub struct PeerState {
    n: usize,
    clock: LamportProcess,
    queue: PendingQueue,
    replies: BTreeSet<PeerId>,
    requesting: bool,
    phase: Phase,
}

impl PeerState {
    pub fn new(i: PeerId, n_peers: usize, seed: LamportClock) -> Self {
        assert!(
            i < n_peers,
            "Expect 0-based index of peer {i} < n_peers={n_peers}"
        );
        Self {
            n: n_peers,
            clock: LamportProcess::new(i, seed),
            queue: PendingQueue::new(),
            replies: BTreeSet::new(),
            requesting: false,
            phase: Phase::Idle,
        }
    }

    pub fn pid(&self) -> PeerId {
        self.clock.pid()
    }
    pub fn n_peers(&self) -> usize {
        self.n
    }
    pub fn now(&self) -> LamportClock {
        self.clock.now()
    }
    pub fn snapshot(&self) -> &[LamportClock] {
        self.clock.snapshot()
    }
    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }
    pub fn phase(&self) -> Phase {
        self.phase
    }
    pub fn is_requesting(&self) -> bool {
        self.requesting
    }
    pub fn replies_received(&self) -> usize {
        self.replies.len()
    }
    pub fn replies_needed(&self) -> usize {
        self.n - 1
    }
    pub fn has_all_replies(&self) -> bool {
        self.replies_received() == self.replies_needed()
    }

    fn expect_phase(&self, expected: Phase) {
        assert_eq!(
            self.phase,
            expected,
            "peer {} in phase {:?}, expected {expected:?}",
            self.pid(),
            self.phase
        );
    }

    fn expect_source(&self, source: PeerId) {
        assert!(
            source != self.pid() && source < self.n,
            "peer {} got a message from invalid source {source}",
            self.pid()
        );
    }

    /// Idle -> Requesting: stamps and queues our own request.
    pub fn request(&mut self) -> Request {
        self.expect_phase(Phase::Idle);
        let request = Request::new(self.clock.advance_local(), self.pid());
        self.queue.insert(request);
        self.requesting = true;
        self.phase = Phase::Requesting;
        request
    }

    /// Requesting -> AwaitingReplies, once the request went out.
    pub fn await_replies(&mut self) {
        self.expect_phase(Phase::Requesting);
        self.phase = Phase::AwaitingReplies;
    }

    pub fn on_request(&mut self, source: PeerId, request: Request) -> LamportClock {
        self.expect_source(source);
        assert_eq!(
            request.peer, source,
            "peer {source} sent a request on behalf of peer {}",
            request.peer
        );
        let clock = self.clock.advance_on_receive(&request.timestamp);
        self.queue.insert(request);
        clock
    }

    pub fn on_reply(&mut self, source: PeerId) {
        self.expect_source(source);
        assert!(
            self.requesting,
            "peer {} got a reply from {source} without an outstanding request",
            self.pid()
        );
        assert!(
            self.replies.insert(source),
            "peer {} got a second reply from peer {source}",
            self.pid()
        );
    }

    // No-op if the peer has nothing queued
    pub fn on_release(&mut self, source: PeerId) -> Option<Request> {
        self.expect_source(source);
        self.queue.remove_by_peer(source)
    }

    /// AwaitingReplies -> InCriticalSection.
    pub fn enter(&mut self) {
        self.expect_phase(Phase::AwaitingReplies);
        assert!(
            self.has_all_replies(),
            "peer {} entering with {}/{} replies",
            self.pid(),
            self.replies_received(),
            self.replies_needed()
        );
        self.phase = Phase::InCriticalSection;
    }

    /// InCriticalSection -> Releasing, after the round barrier.
    pub fn exit(&mut self) {
        self.expect_phase(Phase::InCriticalSection);
        self.requesting = false;
        self.replies.clear();
        self.phase = Phase::Releasing;
    }

    // Every queued peer behind the head, except ourselves
    pub fn release_targets(&self) -> Vec<PeerId> {
        self.queue
            .entries_excluding_first()
            .iter()
            .map(|r| r.peer)
            .filter(|&peer| peer != self.pid())
            .collect()
    }

    /// Releasing -> Idle.
    pub fn finish_round(&mut self) {
        self.expect_phase(Phase::Releasing);
        self.queue.clear();
        self.phase = Phase::Idle;
    }
}

/// What one peer observed during one round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundReport {
    pub round: usize,
    pub request: Request,
    pub queue_at_start: Vec<Request>,
    pub queue_at_entry: Vec<Request>,
    pub replies_from: Vec<PeerId>,
    pub released_to: Vec<PeerId>,
}

/// Drives a [`PeerState`] over a transport and a round barrier.
pub struct Peer<T, B> {
    state: PeerState,
    transport: T,
    barrier: B,
    round: usize,
}

impl<T: Transport, B: RoundBarrier> Peer<T, B> {
    pub fn new(transport: T, barrier: B, seed: LamportClock) -> Self {
        Self {
            state: PeerState::new(transport.pid(), transport.n_peers(), seed),
            transport,
            barrier,
            round: 0,
        }
    }

    pub fn state(&self) -> &PeerState {
        &self.state
    }

    pub fn snapshot(&self) -> &[LamportClock] {
        self.state.snapshot()
    }

    /// Runs `rounds` rounds, then waits for every peer to finish before returning.
    pub fn run<F: FnMut(usize)>(
        &mut self,
        rounds: usize,
        mut critical_section: F,
    ) -> Result<Vec<RoundReport>> {
        let reports = (0..rounds)
            .map(|_| self.run_round(&mut critical_section))
            .collect::<Result<Vec<_>>>()?;
        self.shutdown()?;
        Ok(reports)
    }

    pub fn run_round<F: FnOnce(usize)>(&mut self, critical_section: F) -> Result<RoundReport> {
        self.round += 1;
        let round = self.round;
        let peer = self.state.pid();
        let queue_at_start = self.state.queue().as_slice().to_vec();

        let request = self.state.request();
        info!(peer, clock = %request.timestamp, round, "sending requests");
        self.transport
            .broadcast(Message::Request(request))
            .with_context(|| format!("peer {peer} broadcasting request"))?;
        self.state.await_replies();

        while !self.state.has_all_replies() {
            let envelope = self
                .transport
                .receive_any()
                .with_context(|| format!("peer {peer} awaiting replies"))?;
            self.dispatch(envelope)?;
        }

        let queue_at_entry = self.state.queue().as_slice().to_vec();
        let replies_from = self.state.replies.iter().copied().collect();
        self.state.enter();
        info!(peer, clock = %self.state.now(), round, "entering critical section");
        critical_section(round);
        info!(peer, clock = %self.state.now(), round, "exiting critical section");

        self.barrier
            .rendezvous()
            .with_context(|| format!("peer {peer} at barrier of round {round}"))?;
        debug!(peer, round, "passed barrier");
        self.state.exit();

        let released_to = self.state.release_targets();
        for &to in &released_to {
            self.transport
                .send_to(to, Message::Release)
                .with_context(|| format!("peer {peer} releasing peer {to}"))?;
            info!(peer, to, clock = %self.state.now(), "sent release");
        }
        self.state.finish_round();

        Ok(RoundReport {
            round,
            request,
            queue_at_start,
            queue_at_entry,
            replies_from,
            released_to,
        })
    }

    // Collective finish, keeps the inbox open until every release was sent
    pub fn shutdown(&mut self) -> Result<()> {
        self.barrier
            .rendezvous()
            .with_context(|| format!("peer {} at final barrier", self.state.pid()))
    }

    fn dispatch(&mut self, Envelope { source, message }: Envelope) -> Result<()> {
        let peer = self.state.pid();
        debug!(peer, from = source, kind = %message.kind(), "dispatching");
        match message {
            Message::Request(request) => {
                info!(peer, from = source, clock = %self.state.now(), "received request");
                let clock = self.state.on_request(source, request);
                self.transport
                    .send_to(source, Message::Reply)
                    .with_context(|| format!("peer {peer} replying to peer {source}"))?;
                info!(peer, to = source, %clock, "sent reply");
            }
            Message::Reply => {
                self.state.on_reply(source);
                info!(peer, from = source, clock = %self.state.now(), "received reply");
            }
            Message::Release => {
                let removed = self.state.on_release(source);
                info!(peer, from = source, clock = %self.state.now(), ?removed, "received release");
            }
        }
        Ok(())
    }
}
