#![allow(dead_code)]

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use epi_core::{run_worker, Coordinator, ShardAcceptor, ShardHandle, ShardWorker, WorkerError};
use epi_runtime::{ContagionParameters, Position};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker threads of a test cluster. Each returns its worker once the
/// coordinator sends `ExitSim`, so tests can inspect the final grids.
pub struct Workers {
    threads: Vec<JoinHandle<Result<ShardWorker, WorkerError>>>,
}

impl Workers {
    pub fn join(self) -> Result<Vec<ShardWorker>> {
        self.threads
            .into_iter()
            .map(|thread| {
                thread
                    .join()
                    .map_err(|_| anyhow!("worker thread panicked"))?
                    .map_err(anyhow::Error::from)
            })
            .collect()
    }
}

pub fn spawn_worker(master: SocketAddr, seed: u64) -> JoinHandle<Result<ShardWorker, WorkerError>> {
    thread::spawn(move || {
        let mut worker = ShardWorker::with_seed(seed);
        run_worker(master, &mut worker).map(|()| worker)
    })
}

/// Starts an acceptor on an ephemeral port, connects `count` in-process
/// workers one after another and returns their coordinator-side handles.
/// Worker `i` of the returned [`Workers`] owns shard `i`.
pub fn connect_workers(count: usize) -> Result<(Vec<ShardHandle>, Workers)> {
    let mut acceptor = ShardAcceptor::bind("127.0.0.1:0")?;
    acceptor.start()?;
    let master = acceptor.local_addr();
    let mut threads = Vec::with_capacity(count);
    for index in 0..count {
        threads.push(spawn_worker(master, 1000 + index as u64));
        if !acceptor.wait_for(index + 1, CONNECT_TIMEOUT) {
            bail!("only {} of {count} workers connected", acceptor.connected());
        }
    }
    Ok((acceptor.stop(), Workers { threads }))
}

/// A coordinator with its shards set up over `world` and the given
/// parameters installed.
pub fn cluster(
    world: Position,
    shards: usize,
    params: ContagionParameters,
) -> Result<(Coordinator, Workers)> {
    let (handles, workers) = connect_workers(shards)?;
    let mut coordinator = Coordinator::new(handles, world)?;
    coordinator.set_up()?;
    coordinator.update_contagion_parameters(params)?;
    Ok((coordinator, workers))
}

/// Parameters under which nobody's health ever changes.
pub fn frozen_parameters() -> ContagionParameters {
    ContagionParameters {
        default_spread_chance: 0.0,
        recovery_chance: 0.0,
        death_chance: 0.0,
        quarantine_chance: 0.0,
        ..ContagionParameters::default()
    }
}
