use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use epi_runtime::{Area, ContagionParameters};

use crate::coordinator::{Coordinator, CoordinatorError, RoundReport};
use crate::events::{EventHub, RoundSubscription};
use crate::extract::Extract;
use crate::handle::lock;

pub type RoundOutcome = Result<RoundReport, CoordinatorError>;

enum Command {
    Step(Sender<RoundOutcome>),
    SetParameters(ContagionParameters),
    RefreshExtract,
    Autoplay(Option<Duration>),
    Shutdown,
}

#[derive(Default)]
struct Activity {
    in_progress: bool,
    queued: usize,
}

struct ExtractSlot {
    window: Area,
    latest: Option<Arc<Extract>>,
}

struct Shared {
    activity: Mutex<Activity>,
    idle: Condvar,
    extract: Mutex<ExtractSlot>,
}

impl Shared {
    fn enqueue(&self) {
        lock(&self.activity).queued += 1;
    }

    fn dequeue(&self) {
        let mut activity = lock(&self.activity);
        activity.queued = activity.queued.saturating_sub(1);
        self.notify_if_idle(&activity);
    }

    fn begin_round(&self) {
        lock(&self.activity).in_progress = true;
    }

    fn end_round(&self) {
        let mut activity = lock(&self.activity);
        activity.in_progress = false;
        self.notify_if_idle(&activity);
    }

    fn notify_if_idle(&self, activity: &Activity) {
        if !activity.in_progress && activity.queued == 0 {
            self.idle.notify_all();
        }
    }
}

/// Runs a [`Coordinator`] on its own thread and feeds it commands, so
/// callers never block on shard I/O unless they ask to.
pub struct SimulationController {
    world: Area,
    commands: Sender<Command>,
    shared: Arc<Shared>,
    events: EventHub,
    thread: Option<JoinHandle<()>>,
}

impl SimulationController {
    pub fn spawn(coordinator: Coordinator) -> Self {
        let (commands, receiver) = unbounded();
        let shared = Arc::new(Shared {
            activity: Mutex::new(Activity::default()),
            idle: Condvar::new(),
            extract: Mutex::new(ExtractSlot {
                window: coordinator.extract_window(),
                latest: coordinator.last_extract(),
            }),
        });
        let events = coordinator.events();
        let world = Area::from_size(coordinator.world_size());
        let thread = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || run(coordinator, receiver, shared))
        };
        Self {
            world,
            commands,
            shared,
            events,
            thread: Some(thread),
        }
    }

    /// Queues one round. The receiver yields its outcome exactly once.
    pub fn step(&self) -> Receiver<RoundOutcome> {
        let (reply, outcome) = bounded(1);
        self.send(Command::Step(reply));
        outcome
    }

    /// Applied to the shards before any round queued after this call.
    pub fn set_parameters(&self, params: ContagionParameters) {
        self.send(Command::SetParameters(params));
    }

    /// Returns the latest extract at once and queues a refresh of `window`,
    /// clipped to the world. When the window changed, the returned extract
    /// keeps only the previous data that falls inside the new window.
    pub fn extract(&self, window: Area) -> Option<Arc<Extract>> {
        let window = self.world.intersection(&window);
        let latest = {
            let mut slot = lock(&self.shared.extract);
            if slot.window != window {
                slot.window = window;
                slot.latest = slot
                    .latest
                    .as_ref()
                    .map(|previous| Arc::new(Extract::resized_from(previous, window)));
            }
            slot.latest.clone()
        };
        self.send(Command::RefreshExtract);
        latest
    }

    /// Keeps running rounds, starting them at least `delay` apart, until the
    /// epidemic ends, a round fails or autoplay is turned off with `None`.
    pub fn set_autoplay(&self, delay: Option<Duration>) {
        self.send(Command::Autoplay(delay));
    }

    pub fn is_round_in_progress(&self) -> bool {
        lock(&self.shared.activity).in_progress
    }

    /// Blocks until no round is running and every queued command was handled.
    pub fn wait_idle(&self) {
        let mut activity = lock(&self.shared.activity);
        while activity.in_progress || activity.queued > 0 {
            activity = self
                .shared
                .idle
                .wait(activity)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    pub fn subscribe(&self) -> RoundSubscription {
        self.events.subscribe()
    }

    /// Stops the controller thread; the shards are told to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, command: Command) {
        self.shared.enqueue();
        if self.commands.send(command).is_err() {
            self.shared.dequeue();
            tracing::warn!(target: "epigrid::coordinator", "controller.stopped");
        }
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(target: "epigrid::coordinator", "controller.thread_panicked");
            }
        }
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut coordinator: Coordinator, commands: Receiver<Command>, shared: Arc<Shared>) {
    let mut autoplay: Option<Duration> = None;
    let mut next_autoplay = Instant::now();

    loop {
        let command = if autoplay.is_some() {
            match commands.recv_deadline(next_autoplay) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        let queued = command.is_some();
        match command {
            None => {
                let started = Instant::now();
                match play_round(&mut coordinator, &shared) {
                    Ok(report) if !report.finished => {}
                    _ => {
                        tracing::info!(target: "epigrid::coordinator", "controller.autoplay_stopped");
                        autoplay = None;
                    }
                }
                if let Some(delay) = autoplay {
                    next_autoplay = started + delay;
                }
            }
            Some(Command::Step(reply)) => {
                let outcome = play_round(&mut coordinator, &shared);
                let _ = reply.send(outcome);
            }
            Some(Command::SetParameters(params)) => {
                if let Err(err) = coordinator.update_contagion_parameters(params) {
                    tracing::error!(
                        target: "epigrid::coordinator",
                        error = %err,
                        "controller.parameters_failed"
                    );
                }
            }
            Some(Command::RefreshExtract) => {
                let window = lock(&shared.extract).window;
                coordinator.set_extract_window(window);
                match coordinator.refresh_extract() {
                    Ok(extract) => store_extract(&shared, extract),
                    Err(err) => tracing::warn!(
                        target: "epigrid::coordinator",
                        error = %err,
                        "controller.extract_failed"
                    ),
                }
            }
            Some(Command::Autoplay(delay)) => {
                autoplay = delay;
                next_autoplay = Instant::now();
                tracing::info!(
                    target: "epigrid::coordinator",
                    delay_ms = delay.map(|d| d.as_millis() as u64),
                    "controller.autoplay"
                );
            }
            Some(Command::Shutdown) => break,
        }
        if queued {
            shared.dequeue();
        }
    }

    coordinator.exit_shards();
}

fn play_round(coordinator: &mut Coordinator, shared: &Shared) -> RoundOutcome {
    shared.begin_round();
    coordinator.set_extract_window(lock(&shared.extract).window);
    let outcome = coordinator.make_round();
    if outcome.is_ok() {
        if let Some(extract) = coordinator.last_extract() {
            store_extract(shared, extract);
        }
    }
    shared.end_round();
    outcome
}

fn store_extract(shared: &Shared, extract: Arc<Extract>) {
    let mut slot = lock(&shared.extract);
    if slot.window == extract.window() {
        slot.latest = Some(extract);
    }
}
