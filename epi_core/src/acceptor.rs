use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::handle::{lock, ShardHandle};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const ACCEPT_RETRY: Duration = Duration::from_millis(200);
const PING_INTERVAL: Duration = Duration::from_secs(1);
const PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Roster {
    shards: Mutex<Vec<ShardHandle>>,
    /// Shards taken out of `shards` by the ping thread. Only changed while
    /// the `shards` lock is held.
    checking: AtomicUsize,
    watchers: Mutex<Vec<Sender<usize>>>,
    next_id: Mutex<usize>,
}

impl Roster {
    fn notify(&self, count: usize) {
        lock(&self.watchers).retain(|watcher| watcher.send(count).is_ok());
    }

    fn count(&self) -> usize {
        let shards = lock(&self.shards);
        shards.len() + self.checking.load(Ordering::SeqCst)
    }
}

/// Collects worker connections before the simulation starts. Connected
/// workers are pinged periodically and dropped when they stop answering.
pub struct ShardAcceptor {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    roster: Arc<Roster>,
    running: Arc<AtomicBool>,
    stop_ping: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl ShardAcceptor {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        tracing::info!(target: "epigrid::acceptor", addr = %local_addr, "acceptor.bound");
        Ok(Self {
            listener: Some(listener),
            local_addr,
            roster: Arc::new(Roster::default()),
            running: Arc::new(AtomicBool::new(false)),
            stop_ping: None,
            threads: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts the accept and ping threads. Calling it twice is a no-op.
    pub fn start(&mut self) -> io::Result<()> {
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };
        listener.set_nonblocking(true)?;
        self.running.store(true, Ordering::SeqCst);

        let roster = Arc::clone(&self.roster);
        let running = Arc::clone(&self.running);
        self.threads
            .push(thread::spawn(move || accept_loop(listener, roster, running)));

        let (stop_ping, stopped) = bounded::<()>(0);
        let roster = Arc::clone(&self.roster);
        self.threads
            .push(thread::spawn(move || ping_loop(roster, stopped)));
        self.stop_ping = Some(stop_ping);
        Ok(())
    }

    /// Channel of connected-shard counts, sent on every change.
    pub fn subscribe(&self) -> Receiver<usize> {
        let (sender, receiver) = unbounded();
        lock(&self.roster.watchers).push(sender);
        receiver
    }

    pub fn connected(&self) -> usize {
        self.roster.count()
    }

    /// Waits until at least `count` workers are connected or `timeout`
    /// passes. Returns whether the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let updates = self.subscribe();
        let deadline = Instant::now() + timeout;
        while self.connected() < count {
            match updates.recv_deadline(deadline) {
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return self.connected() >= count;
                }
            }
        }
        true
    }

    /// Stops accepting, drops workers that no longer answer `Ping` and hands
    /// over the rest, numbered in connection order.
    pub fn stop(mut self) -> Vec<ShardHandle> {
        self.halt();
        let shards = std::mem::take(&mut *lock(&self.roster.shards));
        let mut live = Vec::with_capacity(shards.len());
        for mut shard in shards {
            match shard.ping_within(PING_TIMEOUT) {
                Ok(()) => {
                    shard.set_id(live.len());
                    live.push(shard);
                }
                Err(err) => tracing::warn!(
                    target: "epigrid::acceptor",
                    peer = %shard.peer(),
                    error = %err,
                    "acceptor.shard_dropped"
                ),
            }
        }
        tracing::info!(target: "epigrid::acceptor", shards = live.len(), "acceptor.stopped");
        live
    }

    /// Sends `ExitSim` to every connected worker and forgets them.
    pub fn disconnect_all(&self) {
        let shards = std::mem::take(&mut *lock(&self.roster.shards));
        for shard in &shards {
            shard.exit();
        }
        self.roster.notify(0);
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        drop(self.stop_ping.take());
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                tracing::error!(target: "epigrid::acceptor", "acceptor.thread_panicked");
            }
        }
    }
}

impl Drop for ShardAcceptor {
    fn drop(&mut self) {
        self.halt();
    }
}

fn accept_loop(listener: TcpListener, roster: Arc<Roster>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let id = {
                    let mut next = lock(&roster.next_id);
                    *next += 1;
                    *next - 1
                };
                match ShardHandle::new(id, stream) {
                    Ok(shard) => {
                        tracing::info!(target: "epigrid::acceptor", peer = %addr, id, "acceptor.shard_connected");
                        let count = {
                            let mut shards = lock(&roster.shards);
                            shards.push(shard);
                            shards.len() + roster.checking.load(Ordering::SeqCst)
                        };
                        roster.notify(count);
                    }
                    Err(err) => tracing::warn!(
                        target: "epigrid::acceptor",
                        peer = %addr,
                        error = %err,
                        "acceptor.handshake_failed"
                    ),
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                tracing::warn!(target: "epigrid::acceptor", error = %err, "acceptor.accept_failed");
                thread::sleep(ACCEPT_RETRY);
            }
        }
    }
}

fn ping_loop(roster: Arc<Roster>, stopped: Receiver<()>) {
    while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(PING_INTERVAL) {
        // Pinged outside the roster lock so a silent worker cannot stall
        // `connected`, `wait_for` or the accept loop.
        let checked = {
            let mut shards = lock(&roster.shards);
            roster.checking.store(shards.len(), Ordering::SeqCst);
            std::mem::take(&mut *shards)
        };
        let before = checked.len();
        let live: Vec<ShardHandle> = checked
            .into_iter()
            .filter(|shard| match shard.ping_within(PING_TIMEOUT) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        target: "epigrid::acceptor",
                        peer = %shard.peer(),
                        error = %err,
                        "acceptor.shard_lost"
                    );
                    shard.exit();
                    false
                }
            })
            .collect();
        let lost = before - live.len();

        let count = {
            let mut shards = lock(&roster.shards);
            let arrived = std::mem::replace(&mut *shards, live);
            roster.checking.store(0, Ordering::SeqCst);
            shards.extend(arrived);
            shards.len()
        };
        if lost > 0 {
            roster.notify(count);
        }
    }
}
