//! Connection Handler
//!
//! Serves one client: read a command, run it against the backend, write the
//! reply, repeat until the client goes away.
//!
//! Store errors (WRONGTYPE, non-integer INCR, ...) are replies, not
//! connection failures, and so is a reply too large to frame. A frame that
//! cannot be decoded gets one ERROR reply and then the connection is closed,
//! since the stream position is lost.

use std::io::{self, BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::time::Duration;

use crate::backend::Backend;
use crate::error::{EntityKvError, Result};
use crate::protocol::{read_command, write_response, Command, Response};

/// Buffered halves of a TCP stream plus the peer address for logging
pub(crate) struct SplitStream {
    pub reader: BufReader<TcpStream>,
    pub writer: BufWriter<TcpStream>,
    pub peer_addr: String,
}

/// Disable Nagle and split a stream into buffered read/write halves
pub(crate) fn split_stream(stream: TcpStream) -> Result<SplitStream> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    stream.set_nodelay(true)?;

    let read_half = stream.try_clone()?;
    Ok(SplitStream {
        reader: BufReader::new(read_half),
        writer: BufWriter::new(stream),
        peer_addr,
    })
}

/// Apply read/write timeouts in milliseconds; 0 leaves a direction blocking
pub(crate) fn apply_timeouts(stream: &TcpStream, read_ms: u64, write_ms: u64) -> Result<()> {
    if read_ms > 0 {
        stream.set_read_timeout(Some(Duration::from_millis(read_ms)))?;
    }
    if write_ms > 0 {
        stream.set_write_timeout(Some(Duration::from_millis(write_ms)))?;
    }
    Ok(())
}

/// Handles a single client connection
pub struct Connection<B> {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,

    /// This connection's clone of the shared backend
    backend: B,

    peer_addr: String,
}

impl<B: Backend> Connection<B> {
    pub fn new(stream: TcpStream, backend: B) -> Result<Self> {
        let SplitStream {
            reader,
            writer,
            peer_addr,
        } = split_stream(stream)?;

        Ok(Self {
            reader,
            writer,
            backend,
            peer_addr,
        })
    }

    /// Configure connection timeouts (milliseconds, 0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        apply_timeouts(self.reader.get_ref(), read_ms, 0)?;
        apply_timeouts(self.writer.get_ref(), 0, write_ms)
    }

    /// Serve commands until the client disconnects (blocking).
    ///
    /// Disconnects and idle read timeouts end the loop with `Ok`.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        while let Some(command) = self.next_command()? {
            tracing::trace!(
                "{} <- {}",
                self.peer_addr,
                command.command_type().name()
            );

            let response = match execute(&mut self.backend, command) {
                Ok(response) => response,
                Err(e) => Response::error(&error_message(&e)),
            };

            match self.send_response(&response) {
                Ok(()) => {}
                Err(EntityKvError::Io(e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} went away before its reply: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Write a reply. A reply too large to frame is replaced by an ERROR
    /// reply; encoding fails before any byte is written, so the stream stays
    /// aligned.
    fn send_response(&mut self, response: &Response) -> Result<()> {
        match write_response(&mut self.writer, response) {
            Err(EntityKvError::Protocol(message)) => {
                tracing::warn!("Reply to {} dropped: {}", self.peer_addr, message);
                write_response(&mut self.writer, &Response::error(&message))
            }
            other => other,
        }
    }

    /// Next command, or `None` once the client is gone
    fn next_command(&mut self) -> Result<Option<Command>> {
        match read_command(&mut self.reader) {
            Ok(command) => Ok(Some(command)),
            Err(EntityKvError::Io(e)) if is_disconnect(e.kind()) => {
                tracing::debug!("Client {} disconnected", self.peer_addr);
                Ok(None)
            }
            // Windows reports an expired read timeout as TimedOut
            Err(EntityKvError::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                tracing::debug!("Read timeout for client {}", self.peer_addr);
                Ok(None)
            }
            Err(EntityKvError::Io(e)) => {
                tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                Err(EntityKvError::Network(e.to_string()))
            }
            Err(e) => {
                tracing::warn!("Malformed frame from {}: {}", self.peer_addr, e);
                let _ = write_response(&mut self.writer, &Response::error(&e.to_string()));
                Err(e)
            }
        }
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

/// Run one command against a backend
pub fn execute<B: Backend + ?Sized>(backend: &mut B, command: Command) -> Result<Response> {
    Ok(match command {
        Command::Get { key } => Response::optional_bulk(backend.get(&key)?),
        Command::Set { key, value } => {
            backend.set(&key, &value)?;
            Response::Ok
        }
        Command::SetNx { key, value } => Response::Integer(backend.set_if_not_exists(&key, &value)?),
        Command::GetSet { key, value } => Response::optional_bulk(backend.get_and_set(&key, &value)?),
        Command::Exists { key } => Response::Integer(backend.exists(&key)?),
        Command::Delete { keys } => Response::Integer(backend.delete(&keys)?),
        Command::IncrBy { key, delta } => Response::Integer(backend.increment_by(&key, delta)?),
        Command::DecrBy { key, delta } => Response::Integer(backend.decrement_by(&key, delta)?),
        Command::Expire { key, seconds } => Response::Integer(backend.expire(&key, seconds)?),
        Command::ExpireAt { key, timestamp } => {
            Response::Integer(backend.expire_at(&key, timestamp)?)
        }
        Command::Ttl { key } => Response::Integer(backend.ttl(&key)?),
        Command::Keys { pattern } => Response::strings(backend.keys_matching(&pattern)?),
        Command::MGet { keys } => Response::Array(backend.multi_get(&keys)?),
        Command::SAdd { key, member } => {
            backend.set_add(&key, &member)?;
            Response::Ok
        }
        Command::SRem { key, member } => {
            backend.set_remove(&key, &member)?;
            Response::Ok
        }
        Command::SMembers { key } => Response::strings(backend.set_members(&key)?),
        Command::Type { key } => Response::Integer(backend.key_type(&key)? as i64),
        Command::RandomKey => {
            Response::optional_bulk(backend.random_key()?.map(String::into_bytes))
        }
        Command::Save => {
            backend.save()?;
            Response::Ok
        }
        Command::BgSave => {
            backend.save_async()?;
            Response::Ok
        }
        Command::FlushDb => {
            backend.flush_db()?;
            Response::Ok
        }
        Command::FlushAll => {
            backend.flush_all()?;
            Response::Ok
        }
        Command::Ping => Response::Bulk(b"PONG".to_vec()),
    })
}

fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

/// Store-reported errors travel without the local "Backend error:" prefix
fn error_message(error: &EntityKvError) -> String {
    match error {
        EntityKvError::Backend(message) => message.clone(),
        other => other.to_string(),
    }
}
