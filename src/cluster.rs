//! Bootstrapping peers: id assignment, transport setup, logging and the critical section body.

use crate::config::RunConfig;
use crate::logging::peer_dispatch;
use crate::order::{LamportClock, PeerId};
use crate::sync::{Peer, RoundBarrier, RoundReport};
use crate::transport::{tcp, ChannelTransport, Transport};
use anyhow::{anyhow, ensure, Context, Result};
use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tracing::info;

#[derive(Clone, Debug)]
pub struct PeerOutcome {
    pub id: PeerId,
    pub seed: LamportClock,
    pub reports: Vec<RoundReport>,
    pub clock_history: Vec<LamportClock>,
}

/// Runs one peer to completion; the critical section sleeps for the configured time.
pub fn run_peer<T: Transport, B: RoundBarrier>(
    transport: T,
    barrier: B,
    config: &RunConfig,
) -> Result<PeerOutcome> {
    let id = transport.pid();
    let seed = config.clock_seed.draw();
    let body = move || -> Result<PeerOutcome> {
        info!(peer = id, clock = %seed, n_peers = transport.n_peers(), "starting");
        let mut peer = Peer::new(transport, barrier, seed);
        let reports = peer.run(config.rounds, |_| std::thread::sleep(config.critical_section))?;
        info!(peer = id, clock = %peer.state().now(), "finished");
        Ok(PeerOutcome {
            id,
            seed,
            reports,
            clock_history: peer.snapshot().to_vec(),
        })
    };
    match &config.log_dir {
        Some(dir) => {
            let dispatch = peer_dispatch(dir, id)?;
            tracing::dispatcher::with_default(&dispatch, body)
        }
        None => body(),
    }
}

/// Runs `n_peers` peers as threads of this process.
pub fn run_local(n_peers: usize, config: &RunConfig) -> Result<Vec<PeerOutcome>> {
    ensure!(n_peers > 0, "at least one peer is required");
    config.validate()?;

    let barrier = Arc::new(Barrier::new(n_peers));
    let ths = ChannelTransport::mesh(n_peers)
        .into_iter()
        .map(|transport| {
            let barrier = barrier.clone();
            let config = config.clone();
            std::thread::Builder::new()
                .name(format!("peer-{}", transport.pid()))
                .spawn(move || run_peer(transport, barrier, &config))
        })
        .collect::<std::io::Result<Vec<_>>>()
        .context("spawning peer threads")?;

    ths.into_iter()
        .enumerate()
        .map(|(i, th)| match th.join() {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow!("peer {i} panicked")),
        })
        .collect()
}

/// Runs peer `id` of the mesh in `hosts` over TCP.
pub fn run_tcp(
    id: PeerId,
    hosts: &BTreeMap<PeerId, SocketAddr>,
    config: &RunConfig,
    connect_timeout: Duration,
) -> Result<PeerOutcome> {
    config.validate()?;
    let addr = hosts
        .get(&id)
        .with_context(|| format!("peer {id} is not listed in hosts"))?;
    let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
    info!(peer = id, %addr, n_peers = hosts.len(), "listening");
    let (transport, barrier) = tcp::connect(id, listener, hosts, connect_timeout)?;
    run_peer(transport, barrier, config)
}
