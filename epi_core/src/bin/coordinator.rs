use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use epi_core::{
    generate_world, load_simulation_config_from_env, Coordinator, RoundEvent, ShardAcceptor,
    SimulationController,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "epigrid coordinator", long_about = None)]
struct Args {
    /// Address workers connect to (overrides the config file)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Number of workers to wait for
    #[arg(long)]
    shards: Option<usize>,

    /// Seed for world generation
    #[arg(long)]
    seed: Option<u64>,

    /// Run exactly this many rounds instead of playing until the epidemic ends
    #[arg(long)]
    rounds: Option<u64>,

    /// Give up waiting for workers after this many seconds
    #[arg(long, default_value_t = 300)]
    connect_timeout_secs: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let (mut config, config_path) = load_simulation_config_from_env();
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(shards) = args.shards {
        config.shards = shards;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    info!(
        target: "epigrid::coordinator",
        config = ?config_path,
        bind = %config.bind,
        shards = config.shards,
        "coordinator.starting"
    );

    let mut acceptor = ShardAcceptor::bind(config.bind)
        .with_context(|| format!("unable to listen on {}", config.bind))?;
    acceptor.start().context("unable to start accepting workers")?;
    let progress = acceptor.subscribe();
    let wait = std::thread::spawn(move || {
        for count in progress.iter() {
            info!(target: "epigrid::acceptor", connected = count, "acceptor.progress");
        }
    });
    if !acceptor.wait_for(config.shards, Duration::from_secs(args.connect_timeout_secs)) {
        acceptor.disconnect_all();
        bail!(
            "only {} of {} workers connected",
            acceptor.connected(),
            config.shards
        );
    }
    let shards = acceptor.stop();
    let _ = wait.join();

    let mut coordinator = Coordinator::new(shards, config.world_size)?;
    coordinator.set_up()?;
    coordinator.update_contagion_parameters(config.contagion.clone())?;

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let world = generate_world(&config, &mut rng);
    coordinator.distribute_locations(&world.locations)?;
    let placement = coordinator.distribute_people(world.people)?;
    if placement.rejected + placement.unroutable > 0 {
        warn!(
            target: "epigrid::coordinator",
            rejected = placement.rejected,
            unroutable = placement.unroutable,
            "setup.incomplete_placement"
        );
    }
    let initial = coordinator.refresh_stats()?;
    info!(
        target: "epigrid::coordinator",
        healthy = initial.healthy,
        infected = initial.infected,
        vaccinated = initial.vaccinated,
        "setup.completed"
    );

    let controller = SimulationController::spawn(coordinator);
    let result = match args.rounds {
        Some(rounds) => run_rounds(&controller, rounds),
        None => autoplay(&controller, config.autoplay_delay()),
    };
    controller.shutdown();
    result
}

fn run_rounds(controller: &SimulationController, rounds: u64) -> Result<()> {
    for _ in 0..rounds {
        let report = controller
            .step()
            .recv()
            .context("controller stopped before the round finished")??;
        if report.finished {
            info!(target: "epigrid::coordinator", round = report.round, "simulation.no_active_cases");
            break;
        }
    }
    Ok(())
}

fn autoplay(controller: &SimulationController, delay: Duration) -> Result<()> {
    let subscription = controller.subscribe();
    controller.set_autoplay(Some(delay));
    for event in subscription.iter() {
        match event {
            RoundEvent::RoundCompleted { .. } => {}
            RoundEvent::Completed { round, stats } => {
                info!(
                    target: "epigrid::coordinator",
                    round,
                    cured = stats.cured,
                    deceased = stats.deceased,
                    "simulation.finished"
                );
                return Ok(());
            }
            RoundEvent::Failed { reason } => bail!("simulation failed: {reason}"),
        }
    }
    Ok(())
}
