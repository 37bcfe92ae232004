use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use epi_core::{run_worker, ShardWorker};

#[derive(Parser, Debug)]
#[command(author, version, about = "epigrid shard worker", long_about = None)]
struct Args {
    /// Coordinator address to connect to
    #[arg(long, default_value = "127.0.0.1:1666")]
    master: SocketAddr,

    /// Seed for movement and infection draws (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut worker = match args.seed {
        Some(seed) => ShardWorker::with_seed(seed),
        None => ShardWorker::new(),
    };
    info!(target: "epigrid::worker", master = %args.master, "worker.starting");
    run_worker(args.master, &mut worker)
        .with_context(|| format!("shard worker session with {} failed", args.master))?;
    info!(
        target: "epigrid::worker",
        residents = worker.grid().resident_count(),
        "worker.finished"
    );
    Ok(())
}
