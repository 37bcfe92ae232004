use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpStream};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use thiserror::Error;

use epi_runtime::{encode_message, parse_message, Message, MessageKind, WireError};

use crate::shard::ShardGrid;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("coordinator connection failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed command from coordinator: {0}")]
    Wire(#[from] WireError),
}

/// Whether the serve loop keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Executes coordinator commands against one [`ShardGrid`].
pub struct ShardWorker {
    grid: ShardGrid,
    rng: SmallRng,
}

impl Default for ShardWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardWorker {
    pub fn new() -> Self {
        Self {
            grid: ShardGrid::new(),
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            grid: ShardGrid::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn grid(&self) -> &ShardGrid {
        &self.grid
    }

    /// Runs one command and writes its replies to `out` (not flushed).
    pub fn handle<W: Write>(&mut self, message: Message, out: &mut W) -> Result<Flow, WorkerError> {
        match message {
            Message::SetUp { area } => {
                self.grid.set_up(area);
                reply(out, &Message::SimIsSet)?;
            }
            Message::ContagionParameters(params) => {
                self.grid.set_parameters(params);
                reply(out, &Message::ContagionParametersSet)?;
            }
            Message::Location(def) => {
                self.grid.add_location(&def);
            }
            Message::Person { person, target } => {
                let id = person.id;
                let accepted = self.grid.add_person(person, target);
                reply(out, &Message::PersonConfirmation { id, accepted })?;
            }
            Message::PersonConfirmation { id, accepted } => {
                self.grid.confirm(id, accepted);
            }
            Message::MovePeople => {
                for migrant in self.grid.move_people(&mut self.rng) {
                    reply(
                        out,
                        &Message::Person {
                            person: migrant.person,
                            target: migrant.target,
                        },
                    )?;
                }
                reply(out, &Message::PeopleMoved)?;
            }
            Message::CalculateHealth => {
                self.grid.calculate_health(&mut self.rng);
                reply(out, &Message::HealthCalculated)?;
            }
            Message::SendExtract { window } => {
                reply(out, &Message::Extract(self.grid.extract(&window)))?;
            }
            Message::SendStats => {
                reply(out, &Message::Stats(self.grid.stats()))?;
            }
            Message::Ping => {
                reply(out, &Message::Ping)?;
            }
            Message::ExitSim => {
                tracing::info!(target: "epigrid::worker", "worker.exit_requested");
                return Ok(Flow::Exit);
            }
            other => {
                tracing::warn!(
                    target: "epigrid::worker",
                    kind = %other.kind(),
                    "worker.unexpected_reply_kind"
                );
            }
        }
        Ok(Flow::Continue)
    }

    /// Reads commands line by line until `ExitSim` or end of stream. Unknown
    /// message kinds and malformed lines that expect no reply are logged and
    /// skipped; any other malformed command ends the session with an error.
    pub fn serve<R: BufRead, W: Write>(&mut self, reader: R, mut writer: W) -> Result<(), WorkerError> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let message = match parse_message(&line) {
                Ok(message) => message,
                Err(WireError::UnknownKind(kind)) => {
                    tracing::warn!(
                        target: "epigrid::worker",
                        kind = %kind,
                        "worker.unknown_command"
                    );
                    continue;
                }
                Err(err) if err.kind().is_some_and(MessageKind::is_fire_and_forget) => {
                    tracing::warn!(
                        target: "epigrid::worker",
                        line = %line,
                        error = %err,
                        "worker.malformed_line_dropped"
                    );
                    continue;
                }
                Err(err) => {
                    tracing::error!(
                        target: "epigrid::worker",
                        line = %line,
                        error = %err,
                        "worker.malformed_command"
                    );
                    return Err(err.into());
                }
            };
            let flow = self.handle(message, &mut writer)?;
            writer.flush()?;
            if flow == Flow::Exit {
                return Ok(());
            }
        }
        tracing::info!(target: "epigrid::worker", "worker.coordinator_closed");
        Ok(())
    }
}

fn reply<W: Write>(out: &mut W, message: &Message) -> io::Result<()> {
    if message.kind() != MessageKind::Person {
        tracing::trace!(target: "epigrid::worker", kind = %message.kind(), "worker.reply");
    }
    writeln!(out, "{}", encode_message(message))
}

/// Connects to the coordinator at `master` and serves it until told to exit.
pub fn run_worker(master: SocketAddr, worker: &mut ShardWorker) -> Result<(), WorkerError> {
    let stream = TcpStream::connect(master)?;
    if let Err(err) = stream.set_nodelay(true) {
        tracing::warn!(target: "epigrid::worker", error = %err, "worker.nodelay_failed");
    }
    tracing::info!(target: "epigrid::worker", master = %master, "worker.connected");
    let reader = BufReader::new(stream.try_clone()?);
    worker.serve(reader, BufWriter::new(stream))
}
