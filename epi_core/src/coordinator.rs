use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use thiserror::Error;

use epi_runtime::{Area, ContagionParameters, LocationDef, PersonRecord, Position, Stats};

use crate::connection::ShardError;
use crate::events::{EventHub, RoundEvent, RoundSubscription};
use crate::extract::Extract;
use crate::handle::{lock, ShardHandle, WaitingPerson, WaitingPersonConfirmation};
use crate::partition::{partition_world, PartitionError};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no shards connected")]
    NoShards,
    #[error("cannot partition the world: {0}")]
    Partition(#[from] PartitionError),
    #[error("simulation was abandoned after an earlier shard failure")]
    Aborted,
    #[error("shard {shard} failed: {source}")]
    ShardFailed {
        shard: usize,
        #[source]
        source: ShardError,
    },
    #[error("shards have not been set up")]
    NotSetUp,
}

/// Result of one completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u64,
    pub stats: Stats,
    /// No infectious people are left.
    pub finished: bool,
}

/// Outcome of direct placement during setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementReport {
    pub accepted: usize,
    pub rejected: usize,
    /// Homes outside every shard.
    pub unroutable: usize,
}

/// The round engine. Owns one [`ShardHandle`] per worker and drives every
/// phase as a parallel fan-out joined before the next phase starts.
pub struct Coordinator {
    shards: Vec<ShardHandle>,
    world_size: Position,
    params: ContagionParameters,
    is_set_up: bool,
    failed: AtomicBool,
    round: u64,
    completed: bool,
    current_stats: Stats,
    stats_history: Vec<Stats>,
    extract_window: Area,
    last_extract: Option<Arc<Extract>>,
    events: EventHub,
}

impl Coordinator {
    /// Shards are renumbered in the given order.
    pub fn new(mut shards: Vec<ShardHandle>, world_size: Position) -> Result<Self, CoordinatorError> {
        if shards.is_empty() {
            return Err(CoordinatorError::NoShards);
        }
        for (index, shard) in shards.iter_mut().enumerate() {
            shard.set_id(index);
        }
        Ok(Self {
            shards,
            world_size,
            params: ContagionParameters::default(),
            is_set_up: false,
            failed: AtomicBool::new(false),
            round: 0,
            completed: false,
            current_stats: Stats::default(),
            stats_history: Vec::new(),
            extract_window: Area::from_size(world_size),
            last_extract: None,
            events: EventHub::default(),
        })
    }

    pub fn shards(&self) -> &[ShardHandle] {
        &self.shards
    }

    pub fn world_size(&self) -> Position {
        self.world_size
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn parameters(&self) -> &ContagionParameters {
        &self.params
    }

    pub fn current_stats(&self) -> Stats {
        self.current_stats
    }

    pub fn stats_history(&self) -> &[Stats] {
        &self.stats_history
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn subscribe(&self) -> RoundSubscription {
        self.events.subscribe()
    }

    pub fn events(&self) -> EventHub {
        self.events.clone()
    }

    /// Partitions the world between the shards and sets every worker up.
    pub fn set_up(&mut self) -> Result<Vec<Area>, CoordinatorError> {
        let areas = partition_world(self.world_size, self.shards.len())?;
        self.fan_out("set_up", |shard| shard.set_up(areas[shard.id()]))?;
        self.is_set_up = true;
        tracing::info!(
            target: "epigrid::coordinator",
            shards = self.shards.len(),
            world = %self.world_size,
            "coordinator.set_up"
        );
        Ok(areas)
    }

    /// Replaces the contagion parameters on every shard.
    pub fn update_contagion_parameters(
        &mut self,
        params: ContagionParameters,
    ) -> Result<(), CoordinatorError> {
        self.fan_out("contagion_parameters", |shard| {
            shard.send_contagion_parameters(&params)
        })?;
        self.params = params;
        tracing::info!(target: "epigrid::coordinator", "coordinator.parameters_updated");
        Ok(())
    }

    /// Index of the shard whose bounds contain `position`.
    pub fn owner_of(&self, position: Position) -> Option<usize> {
        self.shards
            .iter()
            .position(|shard| shard.contains(position))
    }

    /// Sends each definition to the shard that owns its cell. Returns how
    /// many were sent.
    pub fn distribute_locations(&self, locations: &[LocationDef]) -> Result<usize, CoordinatorError> {
        self.require_set_up()?;
        let mut groups: Vec<Vec<&LocationDef>> = vec![Vec::new(); self.shards.len()];
        for def in locations {
            match self.owner_of(def.position) {
                Some(owner) => groups[owner].push(def),
                None => tracing::warn!(
                    target: "epigrid::coordinator",
                    position = %def.position,
                    "setup.location_unroutable"
                ),
            }
        }
        self.fan_out("distribute_locations", |shard| {
            for def in &groups[shard.id()] {
                shard.send_location(def)?;
            }
            Ok(())
        })?;
        Ok(groups.iter().map(Vec::len).sum())
    }

    /// Places every person on their home cell, on the shard that owns it.
    pub fn distribute_people(
        &self,
        people: Vec<PersonRecord>,
    ) -> Result<PlacementReport, CoordinatorError> {
        self.require_set_up()?;
        let mut report = PlacementReport::default();
        let mut groups: Vec<Vec<PersonRecord>> = vec![Vec::new(); self.shards.len()];
        for person in people {
            match self.owner_of(person.home) {
                Some(owner) => groups[owner].push(person),
                None => report.unroutable += 1,
            }
        }
        let per_shard = self.fan_out("distribute_people", |shard| {
            let mut accepted = 0;
            for person in &groups[shard.id()] {
                let (id, home) = (person.id, person.home);
                if shard.send_person(person.clone(), home)? {
                    accepted += 1;
                } else {
                    tracing::warn!(
                        target: "epigrid::coordinator",
                        shard = shard.id(),
                        id,
                        home = %home,
                        "setup.person_rejected"
                    );
                }
            }
            Ok((accepted, groups[shard.id()].len() - accepted))
        })?;
        for (accepted, rejected) in per_shard {
            report.accepted += accepted;
            report.rejected += rejected;
        }
        tracing::info!(
            target: "epigrid::coordinator",
            accepted = report.accepted,
            rejected = report.rejected,
            unroutable = report.unroutable,
            "setup.people_placed"
        );
        Ok(report)
    }

    /// Queues an emigrant on the shard owning `target`, or a refusal back
    /// to `origin` when no shard owns it.
    pub fn route(&self, origin: usize, person: PersonRecord, target: Position) {
        match self.owner_of(target) {
            Some(owner) => self.shards[owner].enqueue_person(WaitingPerson {
                person,
                target,
                origin,
            }),
            None => match self.shards.get(origin) {
                Some(shard) => shard.enqueue_confirmation(WaitingPersonConfirmation {
                    id: person.id,
                    accepted: false,
                }),
                None => tracing::warn!(
                    target: "epigrid::coordinator",
                    origin,
                    id = person.id,
                    "handoff.unknown_origin"
                ),
            },
        }
    }

    /// One full round: move, deliver migrants, commit verdicts, health,
    /// stats, extract. Any shard failure abandons the simulation.
    pub fn make_round(&mut self) -> Result<RoundReport, CoordinatorError> {
        self.require_set_up()?;

        let emigrants: usize = self
            .fan_out("move_people", |shard| {
                shard.move_people(|origin, person, target| self.route(origin, person, target))
            })?
            .into_iter()
            .sum();
        self.fan_out("resolve_waiting_people", |shard| {
            shard.resolve_waiting_people(&self.shards)
        })?;
        self.fan_out("resolve_waiting_confirmations", |shard| {
            shard.resolve_waiting_confirmations()
        })?;
        self.fan_out("calculate_health", |shard| shard.calculate_health())?;
        let stats = self.gather_stats()?;
        self.refresh_extract()?;

        self.round += 1;
        self.current_stats = stats;
        self.stats_history.push(stats);
        let finished = stats.active_cases() == 0;
        tracing::info!(
            target: "epigrid::coordinator",
            round = self.round,
            emigrants,
            healthy = stats.healthy,
            infected = stats.infected,
            quarantined = stats.quarantined,
            deceased = stats.deceased,
            "round.completed"
        );

        self.events.publish(RoundEvent::RoundCompleted {
            round: self.round,
            stats,
        });
        if finished && !self.completed {
            self.completed = true;
            tracing::info!(target: "epigrid::coordinator", round = self.round, "simulation.completed");
            self.events.publish(RoundEvent::Completed {
                round: self.round,
                stats,
            });
        }

        Ok(RoundReport {
            round: self.round,
            stats,
            finished,
        })
    }

    /// Fetches the world total without running a round and records it.
    pub fn refresh_stats(&mut self) -> Result<Stats, CoordinatorError> {
        let stats = self.gather_stats()?;
        self.current_stats = stats;
        self.stats_history.push(stats);
        Ok(stats)
    }

    pub fn extract_window(&self) -> Area {
        self.extract_window
    }

    /// Takes effect at the next extract refresh. The window is clipped to
    /// the world first.
    pub fn set_extract_window(&mut self, window: Area) {
        self.extract_window = self.clip_to_world(window);
    }

    /// Part of `window` that lies inside the world.
    pub fn clip_to_world(&self, window: Area) -> Area {
        Area::from_size(self.world_size).intersection(&window)
    }

    /// Rebuilds the extract of the current window from every shard.
    pub fn refresh_extract(&mut self) -> Result<Arc<Extract>, CoordinatorError> {
        let window = self.extract_window;
        let replies = self.fan_out("extract", |shard| shard.fetch_extract(window))?;
        let mut extract = Extract::new(window);
        for entry in replies.iter().flatten() {
            extract.insert(entry);
        }
        let extract = Arc::new(extract);
        self.last_extract = Some(Arc::clone(&extract));
        Ok(extract)
    }

    /// Most recently fetched extract; may describe an older window.
    pub fn last_extract(&self) -> Option<Arc<Extract>> {
        self.last_extract.clone()
    }

    /// Best-effort `ExitSim` to every shard.
    pub fn exit_shards(&self) {
        for shard in &self.shards {
            shard.exit();
        }
        tracing::info!(target: "epigrid::coordinator", "coordinator.shards_exited");
    }

    fn gather_stats(&self) -> Result<Stats, CoordinatorError> {
        let total = Mutex::new(Stats::default());
        self.fan_out("stats", |shard| {
            let stats = shard.fetch_stats()?;
            lock(&total).update(&stats);
            Ok(())
        })?;
        let total = total.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(total)
    }

    fn require_set_up(&self) -> Result<(), CoordinatorError> {
        if self.is_failed() {
            return Err(CoordinatorError::Aborted);
        }
        if !self.is_set_up {
            return Err(CoordinatorError::NotSetUp);
        }
        Ok(())
    }

    /// Runs `op` for every shard on its own scoped thread and joins them all.
    /// The first failure trips the sticky error flag, which stops every
    /// later phase, tells the shards to exit and notifies subscribers.
    fn fan_out<T, F>(&self, phase: &'static str, op: F) -> Result<Vec<T>, CoordinatorError>
    where
        T: Send,
        F: Fn(&ShardHandle) -> Result<T, ShardError> + Sync,
    {
        if self.is_failed() {
            return Err(CoordinatorError::Aborted);
        }
        let op = &op;
        let results: Vec<Result<T, ShardError>> = thread::scope(|scope| {
            let workers: Vec<_> = self
                .shards
                .iter()
                .map(|shard| scope.spawn(move || op(shard)))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect()
        });

        let mut values = Vec::with_capacity(results.len());
        let mut failure = None;
        for (shard, result) in results.into_iter().enumerate() {
            match result {
                Ok(value) => values.push(value),
                Err(source) => {
                    tracing::error!(
                        target: "epigrid::coordinator",
                        shard,
                        phase,
                        error = %source,
                        "phase.shard_failed"
                    );
                    failure.get_or_insert(CoordinatorError::ShardFailed { shard, source });
                }
            }
        }
        match failure {
            None => Ok(values),
            Some(err) => {
                self.abandon(&err);
                Err(err)
            }
        }
    }

    fn abandon(&self, err: &CoordinatorError) {
        if self.failed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::error!(
            target: "epigrid::coordinator",
            error = %err,
            "simulation.abandoned"
        );
        self.exit_shards();
        self.events.publish(RoundEvent::Failed {
            reason: err.to_string(),
        });
    }
}
