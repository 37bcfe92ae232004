use std::collections::VecDeque;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use epi_runtime::{
    Area, ContagionParameters, ExtractEntry, LocationDef, Message, MessageKind, PersonId,
    PersonRecord, Position, Stats,
};

use crate::connection::{ShardConnection, ShardError};

/// A migrant queued on its destination shard until the delivery phase.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingPerson {
    pub person: PersonRecord,
    pub target: Position,
    /// Index of the shard that emitted the migrant and awaits the verdict.
    pub origin: usize,
}

/// A verdict queued on the origin shard until the commit phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitingPersonConfirmation {
    pub id: PersonId,
    pub accepted: bool,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinator-side proxy for one connected worker. Safe to share across the
/// per-phase fan-out threads: the connection and each queue sit behind their
/// own lock.
pub struct ShardHandle {
    id: usize,
    peer: SocketAddr,
    connection: Mutex<ShardConnection>,
    bounds: Mutex<Area>,
    waiting_people: Mutex<VecDeque<WaitingPerson>>,
    waiting_confirmations: Mutex<VecDeque<WaitingPersonConfirmation>>,
}

impl ShardHandle {
    pub fn new(id: usize, stream: TcpStream) -> std::io::Result<Self> {
        let connection = ShardConnection::new(stream)?;
        Ok(Self {
            id,
            peer: connection.peer(),
            connection: Mutex::new(connection),
            bounds: Mutex::new(Area::default()),
            waiting_people: Mutex::new(VecDeque::new()),
            waiting_confirmations: Mutex::new(VecDeque::new()),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Area assigned by the last successful [`ShardHandle::set_up`]; empty before.
    pub fn bounds(&self) -> Area {
        *lock(&self.bounds)
    }

    pub fn contains(&self, position: Position) -> bool {
        self.bounds().contains(position)
    }

    /// Round-trips a `Ping`. A worker that stays silent for `timeout`
    /// counts as failed.
    pub fn ping_within(&self, timeout: Duration) -> Result<(), ShardError> {
        let mut connection = lock(&self.connection);
        connection.set_read_timeout(Some(timeout))?;
        let reply = connection.request(&Message::Ping, MessageKind::Ping);
        connection.set_read_timeout(None)?;
        reply.map(|_| ())
    }

    pub fn set_up(&self, area: Area) -> Result<(), ShardError> {
        lock(&self.connection).request(&Message::SetUp { area }, MessageKind::SimIsSet)?;
        *lock(&self.bounds) = area;
        tracing::debug!(
            target: "epigrid::coordinator",
            shard = self.id,
            area = %area,
            "shard.set_up"
        );
        Ok(())
    }

    pub fn send_contagion_parameters(&self, params: &ContagionParameters) -> Result<(), ShardError> {
        lock(&self.connection).request(
            &Message::ContagionParameters(params.clone()),
            MessageKind::ContagionParametersSet,
        )?;
        Ok(())
    }

    pub fn send_location(&self, def: &LocationDef) -> Result<(), ShardError> {
        lock(&self.connection).send(&Message::Location(def.clone()))
    }

    /// Asks the worker to place `person` on `target` and returns its verdict.
    pub fn send_person(&self, person: PersonRecord, target: Position) -> Result<bool, ShardError> {
        let expected = person.id;
        let reply = lock(&self.connection).request(
            &Message::Person { person, target },
            MessageKind::PersonConfirmation,
        )?;
        match reply {
            Message::PersonConfirmation { id, accepted } if id == expected => Ok(accepted),
            Message::PersonConfirmation { id, .. } => Err(ShardError::ConfirmationMismatch {
                expected,
                received: id,
            }),
            other => Err(ShardError::Desync {
                expected: MessageKind::PersonConfirmation,
                received: other.kind(),
            }),
        }
    }

    /// Runs the worker's move pass. Every emigrant line is handed to `route`
    /// together with this shard's id; returns how many there were.
    pub fn move_people<F>(&self, mut route: F) -> Result<usize, ShardError>
    where
        F: FnMut(usize, PersonRecord, Position),
    {
        let mut connection = lock(&self.connection);
        connection.send(&Message::MovePeople)?;
        let mut emigrants = 0;
        loop {
            match connection.receive()? {
                Message::Person { person, target } => {
                    emigrants += 1;
                    route(self.id, person, target);
                }
                Message::PeopleMoved => return Ok(emigrants),
                other => {
                    tracing::error!(
                        target: "epigrid::wire",
                        shard = self.id,
                        received = %other.kind(),
                        "wire.desync"
                    );
                    return Err(ShardError::Desync {
                        expected: MessageKind::PeopleMoved,
                        received: other.kind(),
                    });
                }
            }
        }
    }

    pub fn enqueue_person(&self, waiting: WaitingPerson) {
        lock(&self.waiting_people).push_back(waiting);
    }

    pub fn enqueue_confirmation(&self, confirmation: WaitingPersonConfirmation) {
        lock(&self.waiting_confirmations).push_back(confirmation);
    }

    pub fn waiting_people_len(&self) -> usize {
        lock(&self.waiting_people).len()
    }

    pub fn waiting_confirmations_len(&self) -> usize {
        lock(&self.waiting_confirmations).len()
    }

    /// Delivers queued immigrants one at a time and files each verdict on
    /// the origin shard's confirmation queue.
    pub fn resolve_waiting_people(&self, shards: &[ShardHandle]) -> Result<(), ShardError> {
        loop {
            let Some(waiting) = lock(&self.waiting_people).pop_front() else {
                return Ok(());
            };
            let id = waiting.person.id;
            let accepted = self.send_person(waiting.person, waiting.target)?;
            match shards.get(waiting.origin) {
                Some(origin) => origin.enqueue_confirmation(WaitingPersonConfirmation { id, accepted }),
                None => tracing::warn!(
                    target: "epigrid::coordinator",
                    shard = self.id,
                    origin = waiting.origin,
                    id,
                    "handoff.unknown_origin"
                ),
            }
        }
    }

    /// Sends every queued verdict to this (origin) worker.
    pub fn resolve_waiting_confirmations(&self) -> Result<(), ShardError> {
        loop {
            let Some(WaitingPersonConfirmation { id, accepted }) =
                lock(&self.waiting_confirmations).pop_front()
            else {
                return Ok(());
            };
            lock(&self.connection).send(&Message::PersonConfirmation { id, accepted })?;
        }
    }

    pub fn calculate_health(&self) -> Result<(), ShardError> {
        lock(&self.connection).request(&Message::CalculateHealth, MessageKind::HealthCalculated)?;
        Ok(())
    }

    pub fn fetch_stats(&self) -> Result<Stats, ShardError> {
        match lock(&self.connection).request(&Message::SendStats, MessageKind::Stats)? {
            Message::Stats(stats) => Ok(stats),
            other => Err(ShardError::Desync {
                expected: MessageKind::Stats,
                received: other.kind(),
            }),
        }
    }

    pub fn fetch_extract(&self, window: Area) -> Result<Vec<ExtractEntry>, ShardError> {
        match lock(&self.connection).request(&Message::SendExtract { window }, MessageKind::Extract)? {
            Message::Extract(entries) => Ok(entries),
            other => Err(ShardError::Desync {
                expected: MessageKind::Extract,
                received: other.kind(),
            }),
        }
    }

    /// Tells the worker to exit and closes the socket. Failures are only
    /// logged: the worker is gone either way.
    pub fn exit(&self) {
        let mut connection = lock(&self.connection);
        if let Err(err) = connection.send(&Message::ExitSim) {
            tracing::debug!(
                target: "epigrid::coordinator",
                shard = self.id,
                error = %err,
                "shard.exit_send_failed"
            );
        }
        connection.shutdown();
    }
}
