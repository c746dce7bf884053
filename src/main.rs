use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ramutex::cluster::{self, PeerOutcome};
use ramutex::config::{read_hosts, ClockSeed, RunConfig};
use ramutex::logging;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ramutex")]
#[command(about = "Take turns in a critical section with Lamport-clocked request/reply/release")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every peer as a thread of this process
    Local {
        #[arg(short = 'n', long, default_value_t = 4)]
        peers: usize,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Run a single peer over TCP
    Peer {
        #[arg(long)]
        id: usize,

        /// File with one `id,host:port` line per peer
        #[arg(long)]
        hosts_file: PathBuf,

        #[arg(long, default_value_t = 10_000)]
        connect_timeout_ms: u64,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(short, long, default_value_t = 2)]
    rounds: usize,

    #[arg(long, default_value_t = 2_000)]
    critical_section_ms: u64,

    /// Initial clock of every peer; random in 0..10 per peer if omitted
    #[arg(long)]
    clock_seed: Option<i32>,

    /// Write each peer's log to `<dir>/output_<id>.txt`
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl From<RunArgs> for RunConfig {
    fn from(args: RunArgs) -> Self {
        RunConfig {
            rounds: args.rounds,
            critical_section: Duration::from_millis(args.critical_section_ms),
            clock_seed: ClockSeed::from(args.clock_seed),
            log_dir: args.log_dir,
        }
    }
}

fn summarize(outcome: &PeerOutcome) {
    for r in &outcome.reports {
        info!(
            peer = outcome.id,
            round = r.round,
            request = ?r.request,
            released_to = ?r.released_to,
            "round done"
        );
    }
}

fn main() -> Result<()> {
    logging::init_stderr();

    match Cli::parse().command {
        Command::Local { peers, run } => {
            let config = RunConfig::from(run);
            info!(peers, rounds = config.rounds, "running local cluster");
            for outcome in cluster::run_local(peers, &config)? {
                summarize(&outcome);
            }
        }
        Command::Peer {
            id,
            hosts_file,
            connect_timeout_ms,
            run,
        } => {
            let hosts = read_hosts(&hosts_file)?;
            let config = RunConfig::from(run);
            let outcome = cluster::run_tcp(
                id,
                &hosts,
                &config,
                Duration::from_millis(connect_timeout_ms),
            )?;
            summarize(&outcome);
        }
    }
    Ok(())
}
