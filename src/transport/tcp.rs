//! Full-mesh TCP transport for running every peer as its own process.
//!
//! Each peer listens on its own address and dials every other peer. Frames are newline
//! delimited JSON. The connection a peer dials is only written to; the connections it accepts
//! are only read from, one reader thread each, feeding the protocol inbox and the barrier inbox.
//! Barrier arrivals travel on the same connections as protocol messages so they never overtake
//! a message sent before the rendezvous.

use super::{Envelope, Message, Transport};
use crate::order::PeerId;
use crate::sync::RoundBarrier;
use anyhow::{anyhow, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const DIAL_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize, Deserialize)]
enum Frame {
    Protocol(Message),
    Arrive { round: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct Packet {
    source: PeerId,
    frame: Frame,
}

type Outbound = Arc<Mutex<BTreeMap<PeerId, BufWriter<TcpStream>>>>;

pub struct TcpTransport {
    i: PeerId,
    n: usize,
    outbound: Outbound,
    inbox: Receiver<Envelope>,
}

pub struct TcpBarrier {
    i: PeerId,
    n: usize,
    outbound: Outbound,
    arrivals: Receiver<(PeerId, u64)>,
    round: u64,
    early: BTreeMap<u64, BTreeSet<PeerId>>,
}

/// Joins the mesh described by `hosts` as peer `i`, accepting on `listener`.
///
/// Blocks until a connection to every other peer is established or `timeout` elapses. Inbound
/// connections are accepted in the background and may complete later.
pub fn connect(
    i: PeerId,
    listener: TcpListener,
    hosts: &BTreeMap<PeerId, SocketAddr>,
    timeout: Duration,
) -> Result<(TcpTransport, TcpBarrier)> {
    let n = hosts.len();
    ensure!(hosts.contains_key(&i), "peer {i} is not listed in hosts");

    let (inbox_tx, inbox) = mpsc::channel();
    let (arrivals_tx, arrivals) = mpsc::channel();
    std::thread::spawn(move || {
        if let Err(e) = accept_peers(listener, n - 1, inbox_tx, arrivals_tx) {
            error!(peer = i, "accepting peers failed: {e:#}");
        }
    });

    let deadline = Instant::now() + timeout;
    let mut writers = BTreeMap::new();
    for (&to, &addr) in hosts.iter().filter(|(to, _)| **to != i) {
        let stream = dial(addr, deadline).with_context(|| format!("peer {i} dialing peer {to}"))?;
        stream.set_nodelay(true)?;
        debug!(peer = i, to, %addr, "connected");
        writers.insert(to, BufWriter::new(stream));
    }
    let outbound = Arc::new(Mutex::new(writers));

    Ok((
        TcpTransport {
            i,
            n,
            outbound: outbound.clone(),
            inbox,
        },
        TcpBarrier {
            i,
            n,
            outbound,
            arrivals,
            round: 0,
            early: BTreeMap::new(),
        },
    ))
}

fn dial(addr: SocketAddr, deadline: Instant) -> Result<TcpStream> {
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) if Instant::now() < deadline => {
                debug!(%addr, "peer not up yet: {e}");
                std::thread::sleep(DIAL_BACKOFF);
            }
            Err(e) => return Err(e).with_context(|| format!("connecting to {addr}")),
        }
    }
}

fn accept_peers(
    listener: TcpListener,
    expected: usize,
    inbox: Sender<Envelope>,
    arrivals: Sender<(PeerId, u64)>,
) -> Result<()> {
    for _ in 0..expected {
        let (stream, addr) = listener.accept().context("accepting peer connection")?;
        let inbox = inbox.clone();
        let arrivals = arrivals.clone();
        std::thread::spawn(move || {
            if let Err(e) = read_frames(stream, inbox, arrivals) {
                error!(%addr, "connection failed: {e:#}");
            }
        });
    }
    Ok(())
}

fn read_frames(
    stream: TcpStream,
    inbox: Sender<Envelope>,
    arrivals: Sender<(PeerId, u64)>,
) -> Result<()> {
    for line in BufReader::new(stream).lines() {
        let line = line.context("reading frame")?;
        let packet: Packet = serde_json::from_str(&line)
            .with_context(|| format!("malformed frame {line:?}"))?;
        let delivered = match packet.frame {
            Frame::Protocol(message) => inbox
                .send(Envelope {
                    source: packet.source,
                    message,
                })
                .is_ok(),
            Frame::Arrive { round } => arrivals.send((packet.source, round)).is_ok(),
        };
        if !delivered {
            // Local peer already shut down
            warn!(source = packet.source, "dropping frame after shutdown");
            break;
        }
    }
    Ok(())
}

fn write_packet(outbound: &Outbound, to: PeerId, packet: &Packet) -> Result<()> {
    let mut outbound = outbound
        .lock()
        .map_err(|_| anyhow!("outbound connections poisoned"))?;
    let w = outbound
        .get_mut(&to)
        .ok_or_else(|| anyhow!("no connection to peer {to}"))?;
    serde_json::to_writer(&mut *w, packet)?;
    w.write_all(b"\n")?;
    w.flush().with_context(|| format!("sending to peer {to}"))
}

impl Transport for TcpTransport {
    fn pid(&self) -> PeerId {
        self.i
    }
    fn n_peers(&self) -> usize {
        self.n
    }
    fn send_to(&mut self, to: PeerId, message: Message) -> Result<()> {
        let packet = Packet {
            source: self.i,
            frame: Frame::Protocol(message),
        };
        write_packet(&self.outbound, to, &packet)
    }
    fn receive_any(&mut self) -> Result<Envelope> {
        self.inbox
            .recv()
            .with_context(|| format!("all connections to peer {} closed", self.i))
    }
}

impl TcpBarrier {
    fn arrived(&self, round: u64) -> usize {
        self.early.get(&round).map_or(0, BTreeSet::len)
    }
}

impl RoundBarrier for TcpBarrier {
    fn rendezvous(&mut self) -> Result<()> {
        self.round += 1;
        let packet = Packet {
            source: self.i,
            frame: Frame::Arrive { round: self.round },
        };
        for to in (0..self.n).filter(|&to| to != self.i) {
            write_packet(&self.outbound, to, &packet)?;
        }

        while self.arrived(self.round) < self.n - 1 {
            let (source, round) = self
                .arrivals
                .recv()
                .with_context(|| format!("barrier of peer {} disconnected", self.i))?;
            assert!(
                round >= self.round,
                "peer {source} arrived at finished barrier round {round}, peer {} is at {}",
                self.i,
                self.round
            );
            assert!(
                self.early.entry(round).or_default().insert(source),
                "peer {source} arrived twice at barrier round {round}"
            );
        }
        self.early.remove(&self.round);
        Ok(())
    }
}
