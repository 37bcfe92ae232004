use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;

use epi_runtime::{encode_message, parse_message, Message, MessageKind, PersonId, WireError};

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("shard connection failed: {0}")]
    Io(#[from] io::Error),
    #[error("shard closed the connection")]
    Closed,
    #[error("expected {expected} from shard, received {received}")]
    Desync {
        expected: MessageKind,
        received: MessageKind,
    },
    #[error("confirmation for person {received} while placing person {expected}")]
    ConfirmationMismatch {
        expected: PersonId,
        received: PersonId,
    },
    #[error("shard sent a malformed line: {0}")]
    Wire(#[from] WireError),
}

/// Line-oriented duplex channel to one worker.
pub struct ShardConnection {
    peer: SocketAddr,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    line: String,
}

impl ShardConnection {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nonblocking(false)?;
        if let Err(err) = stream.set_nodelay(true) {
            tracing::warn!(
                target: "epigrid::coordinator",
                peer = %peer,
                error = %err,
                "shard.nodelay_failed"
            );
        }
        Ok(Self {
            peer,
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream.try_clone()?),
            stream,
            line: String::new(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn send(&mut self, message: &Message) -> Result<(), ShardError> {
        tracing::trace!(
            target: "epigrid::wire",
            peer = %self.peer,
            kind = %message.kind(),
            "wire.sent"
        );
        writeln!(self.writer, "{}", encode_message(message))?;
        self.writer.flush()?;
        Ok(())
    }

    /// Next non-empty line from the worker. End of stream is [`ShardError::Closed`].
    pub fn receive(&mut self) -> Result<Message, ShardError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Err(ShardError::Closed);
            }
            if self.line.trim().is_empty() {
                continue;
            }
            return parse_message(&self.line).map_err(|err| {
                tracing::error!(
                    target: "epigrid::wire",
                    peer = %self.peer,
                    line = %self.line.trim_end(),
                    error = %err,
                    "wire.malformed_reply"
                );
                ShardError::Wire(err)
            });
        }
    }

    /// Receives one message and requires it to be of `expected` kind.
    pub fn expect(&mut self, expected: MessageKind) -> Result<Message, ShardError> {
        let message = self.receive()?;
        if message.kind() != expected {
            tracing::error!(
                target: "epigrid::wire",
                peer = %self.peer,
                expected = %expected,
                received = %message.kind(),
                "wire.desync"
            );
            return Err(ShardError::Desync {
                expected,
                received: message.kind(),
            });
        }
        Ok(message)
    }

    pub fn request(&mut self, message: &Message, reply: MessageKind) -> Result<Message, ShardError> {
        self.send(message)?;
        self.expect(reply)
    }

    /// Bounds how long `receive` may block; `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    pub fn shutdown(&self) {
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            tracing::debug!(
                target: "epigrid::coordinator",
                peer = %self.peer,
                error = %err,
                "shard.shutdown_failed"
            );
        }
    }
}
