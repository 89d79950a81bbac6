//! TCP Client
//!
//! [`RemoteBackend`] implements [`Backend`] by sending one command per
//! primitive over a single connection and waiting for its reply. No
//! pipelining, no retries: a failed round-trip is returned to the caller.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;

use crate::backend::{Backend, KeyType};
use crate::config::Config;
use crate::error::{EntityKvError, Result};
use crate::protocol::{read_response, write_command, Command, Response};

use super::connection::{apply_timeouts, split_stream, SplitStream};

/// Backend connection to an `entitykv-server`
pub struct RemoteBackend {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer_addr: String,
}

impl RemoteBackend {
    /// Connect to `addr` with no timeouts
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| EntityKvError::Network(format!("Failed to connect to {}: {}", addr, e)))?;
        Self::from_stream(stream)
    }

    /// Connect to `config.server_addr` using the configured timeouts
    pub fn connect_with(config: &Config) -> Result<Self> {
        let backend = Self::connect(&config.server_addr)?;
        apply_timeouts(
            backend.reader.get_ref(),
            config.read_timeout_ms,
            config.write_timeout_ms,
        )?;
        Ok(backend)
    }

    fn from_stream(stream: TcpStream) -> Result<Self> {
        let SplitStream {
            reader,
            writer,
            peer_addr,
        } = split_stream(stream)?;
        Ok(Self {
            reader,
            writer,
            peer_addr,
        })
    }

    /// Server address
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Health check
    pub fn ping(&mut self) -> Result<()> {
        match self.call(Command::Ping)? {
            Response::Bulk(body) if body == b"PONG" => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    /// One request/response round-trip; ERROR replies become `Backend` errors
    pub fn call(&mut self, command: Command) -> Result<Response> {
        tracing::trace!("-> {}: {}", self.peer_addr, command.command_type().name());
        write_command(&mut self.writer, &command)?;
        match read_response(&mut self.reader)? {
            Response::Error(message) => Err(EntityKvError::Backend(message)),
            response => Ok(response),
        }
    }

    fn call_ok(&mut self, command: Command) -> Result<()> {
        let name = command.command_type().name();
        match self.call(command)? {
            Response::Ok => Ok(()),
            other => Err(unexpected(name, &other)),
        }
    }

    fn call_integer(&mut self, command: Command) -> Result<i64> {
        let name = command.command_type().name();
        match self.call(command)? {
            Response::Integer(n) => Ok(n),
            other => Err(unexpected(name, &other)),
        }
    }

    fn call_optional_bulk(&mut self, command: Command) -> Result<Option<Vec<u8>>> {
        let name = command.command_type().name();
        match self.call(command)? {
            Response::Bulk(bytes) => Ok(Some(bytes)),
            Response::Nil => Ok(None),
            other => Err(unexpected(name, &other)),
        }
    }

    fn call_array(&mut self, command: Command) -> Result<Vec<Option<Vec<u8>>>> {
        let name = command.command_type().name();
        match self.call(command)? {
            Response::Array(items) => Ok(items),
            other => Err(unexpected(name, &other)),
        }
    }

    fn call_strings(&mut self, command: Command) -> Result<Vec<String>> {
        self.call_array(command)?
            .into_iter()
            .map(|item| {
                let bytes = item.ok_or_else(|| {
                    EntityKvError::Protocol("unexpected nil in string list".to_string())
                })?;
                String::from_utf8(bytes)
                    .map_err(|e| EntityKvError::Protocol(format!("string is not UTF-8: {}", e)))
            })
            .collect()
    }
}

impl Backend for RemoteBackend {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.call_optional_bulk(Command::Get { key: key.to_string() })
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.call_ok(Command::Set {
            key: key.to_string(),
            value: value.to_vec(),
        })
    }

    fn set_if_not_exists(&mut self, key: &str, value: &[u8]) -> Result<i64> {
        self.call_integer(Command::SetNx {
            key: key.to_string(),
            value: value.to_vec(),
        })
    }

    fn get_and_set(&mut self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.call_optional_bulk(Command::GetSet {
            key: key.to_string(),
            value: value.to_vec(),
        })
    }

    fn exists(&mut self, key: &str) -> Result<i64> {
        self.call_integer(Command::Exists { key: key.to_string() })
    }

    fn delete(&mut self, keys: &[String]) -> Result<i64> {
        self.call_integer(Command::Delete { keys: keys.to_vec() })
    }

    fn increment_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.call_integer(Command::IncrBy {
            key: key.to_string(),
            delta,
        })
    }

    fn decrement_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.call_integer(Command::DecrBy {
            key: key.to_string(),
            delta,
        })
    }

    fn expire(&mut self, key: &str, seconds: i64) -> Result<i64> {
        self.call_integer(Command::Expire {
            key: key.to_string(),
            seconds,
        })
    }

    fn expire_at(&mut self, key: &str, unix_timestamp: i64) -> Result<i64> {
        self.call_integer(Command::ExpireAt {
            key: key.to_string(),
            timestamp: unix_timestamp,
        })
    }

    fn ttl(&mut self, key: &str) -> Result<i64> {
        self.call_integer(Command::Ttl { key: key.to_string() })
    }

    fn keys_matching(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.call_strings(Command::Keys {
            pattern: pattern.to_string(),
        })
    }

    fn multi_get(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let items = self.call_array(Command::MGet { keys: keys.to_vec() })?;
        if items.len() != keys.len() {
            return Err(EntityKvError::Protocol(format!(
                "MGET returned {} values for {} keys",
                items.len(),
                keys.len()
            )));
        }
        Ok(items)
    }

    fn set_add(&mut self, set_key: &str, member: &str) -> Result<()> {
        self.call_ok(Command::SAdd {
            key: set_key.to_string(),
            member: member.to_string(),
        })
    }

    fn set_remove(&mut self, set_key: &str, member: &str) -> Result<()> {
        self.call_ok(Command::SRem {
            key: set_key.to_string(),
            member: member.to_string(),
        })
    }

    fn set_members(&mut self, set_key: &str) -> Result<Vec<String>> {
        self.call_strings(Command::SMembers {
            key: set_key.to_string(),
        })
    }

    fn key_type(&mut self, key: &str) -> Result<KeyType> {
        let code = self.call_integer(Command::Type { key: key.to_string() })?;
        let byte = u8::try_from(code)
            .map_err(|_| EntityKvError::Protocol(format!("Unknown key type: {}", code)))?;
        KeyType::from_u8(byte)
    }

    fn random_key(&mut self) -> Result<Option<String>> {
        self.call_optional_bulk(Command::RandomKey)?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| EntityKvError::Protocol(format!("key is not UTF-8: {}", e)))
            })
            .transpose()
    }

    fn save(&mut self) -> Result<()> {
        self.call_ok(Command::Save)
    }

    fn save_async(&mut self) -> Result<()> {
        self.call_ok(Command::BgSave)
    }

    fn flush_db(&mut self) -> Result<()> {
        self.call_ok(Command::FlushDb)
    }

    fn flush_all(&mut self) -> Result<()> {
        self.call_ok(Command::FlushAll)
    }
}

fn unexpected(command: &str, response: &Response) -> EntityKvError {
    EntityKvError::Protocol(format!(
        "{}: unexpected {:?} response",
        command,
        response.status()
    ))
}
