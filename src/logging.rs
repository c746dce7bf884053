use crate::order::PeerId;
use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn peer_log_path(dir: &Path, peer: PeerId) -> PathBuf {
    dir.join(format!("output_{peer}.txt"))
}

/// Subscriber writing one peer's events to `<dir>/output_<peer>.txt`.
pub fn peer_dispatch(dir: &Path, peer: PeerId) -> Result<Dispatch> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let path = peer_log_path(dir, peer);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .finish();
    Ok(Dispatch::new(subscriber))
}

/// Process-wide subscriber on stderr.
pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}
