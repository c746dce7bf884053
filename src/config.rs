use crate::order::{LamportClock, PeerId};
use anyhow::{bail, ensure, Context, Result};
use rand::Rng;
use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Initial clock value of a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSeed {
    /// Uniform in `0..below`, drawn per peer.
    Random { below: i32 },
    Fixed(LamportClock),
}

impl Default for ClockSeed {
    fn default() -> Self {
        ClockSeed::Random { below: 10 }
    }
}

impl ClockSeed {
    pub fn draw(&self) -> LamportClock {
        match *self {
            ClockSeed::Random { below } => LamportClock(rand::thread_rng().gen_range(0..below)),
            ClockSeed::Fixed(seed) => seed,
        }
    }
}

impl From<Option<i32>> for ClockSeed {
    fn from(fixed: Option<i32>) -> Self {
        fixed.map_or_else(ClockSeed::default, |t| ClockSeed::Fixed(LamportClock(t)))
    }
}

/// What every peer of a run agrees on.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub rounds: usize,
    pub critical_section: Duration,
    pub clock_seed: ClockSeed,
    pub log_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.rounds > 0, "at least one round is required");
        if let ClockSeed::Random { below } = self.clock_seed {
            ensure!(below > 0, "random clock seed bound must be positive, got {below}");
        }
        Ok(())
    }
}

pub fn read_hosts(path: &Path) -> Result<BTreeMap<PeerId, SocketAddr>> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading hosts file {}", path.display()))?;
    parse_hosts(&s).with_context(|| format!("parsing hosts file {}", path.display()))
}

/// Parses `id,host:port` lines. Ids must be exactly `0..N`.
pub fn parse_hosts(s: &str) -> Result<BTreeMap<PeerId, SocketAddr>> {
    let mut hosts = BTreeMap::new();
    for (n, line) in s.lines().enumerate().map(|(n, l)| (n + 1, l.trim())) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((id, addr)) = line.split_once(',') else {
            bail!("line {n}: expected `id,host:port`, got {line:?}");
        };
        let id: PeerId = id
            .trim()
            .parse()
            .with_context(|| format!("line {n}: bad peer id {id:?}"))?;
        let addr = addr
            .trim()
            .to_socket_addrs()
            .with_context(|| format!("line {n}: bad address {addr:?}"))?
            .next()
            .with_context(|| format!("line {n}: {addr:?} resolves to nothing"))?;
        ensure!(
            hosts.insert(id, addr).is_none(),
            "line {n}: peer {id} listed twice"
        );
    }
    ensure!(!hosts.is_empty(), "no peers listed");
    let n = hosts.len();
    if let Some((&last, _)) = hosts.last_key_value() {
        ensure!(last == n - 1, "peer ids must be 0..{n}, found {last}");
    }
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use crate::config::{parse_hosts, ClockSeed, RunConfig};
    use crate::order::LamportClock;
    use std::net::SocketAddr;
    use std::time::Duration;

    #[test]
    fn parses_hosts() {
        let hosts = parse_hosts(
            "# id,address\n1,127.0.0.1:7001\n\n0, 127.0.0.1:7000\n2,127.0.0.1:7002\n",
        )
        .unwrap();
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[&0], "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(hosts[&2].port(), 7002);
    }

    #[test]
    fn rejects_bad_hosts() {
        assert!(parse_hosts("").is_err());
        assert!(parse_hosts("0 127.0.0.1:7000").is_err());
        assert!(parse_hosts("x,127.0.0.1:7000").is_err());
        assert!(parse_hosts("0,127.0.0.1").is_err());
        // duplicate id
        assert!(parse_hosts("0,127.0.0.1:7000\n0,127.0.0.1:7001").is_err());
        // gap in ids
        assert!(parse_hosts("0,127.0.0.1:7000\n2,127.0.0.1:7001").is_err());
    }

    #[test]
    fn clock_seeds() {
        assert_eq!(ClockSeed::from(Some(5)).draw(), LamportClock(5));
        for _ in 0..100 {
            let LamportClock(t) = ClockSeed::from(None).draw();
            assert!((0..10).contains(&t));
        }
    }

    #[test]
    fn validates_run() {
        let mut cfg = RunConfig {
            rounds: 2,
            critical_section: Duration::ZERO,
            clock_seed: ClockSeed::default(),
            log_dir: None,
        };
        assert!(cfg.validate().is_ok());
        cfg.clock_seed = ClockSeed::Random { below: 0 };
        assert!(cfg.validate().is_err());
        cfg.clock_seed = ClockSeed::default();
        cfg.rounds = 0;
        assert!(cfg.validate().is_err());
    }
}
