//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload Fields
//! - bytes / string: len (4) + data
//! - integer:        8 bytes, two's complement
//! - string list:    count (4) + strings
//!
//! All integers big-endian.
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! - OK / NIL: empty
//! - INTEGER:  8 bytes
//! - BULK:     raw bytes
//! - ARRAY:    count (4) + per item: present (1) [+ len (4) + data]
//! - ERROR:    UTF-8 message

use std::io::{Read, Write};

use bytes::{Buf, BufMut};

use crate::error::{EntityKvError, Result};
use super::{Command, CommandType, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload.
/// Fails without producing a frame if the payload exceeds [`MAX_PAYLOAD_SIZE`].
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    let mut payload = Vec::new();

    match command {
        Command::Get { key }
        | Command::Exists { key }
        | Command::Ttl { key }
        | Command::SMembers { key }
        | Command::Type { key } => put_field(&mut payload, key.as_bytes()),

        Command::Set { key, value }
        | Command::SetNx { key, value }
        | Command::GetSet { key, value } => {
            put_field(&mut payload, key.as_bytes());
            put_field(&mut payload, value);
        }

        Command::Delete { keys } | Command::MGet { keys } => put_strings(&mut payload, keys),

        Command::IncrBy { key, delta: n }
        | Command::DecrBy { key, delta: n }
        | Command::Expire { key, seconds: n }
        | Command::ExpireAt { key, timestamp: n } => {
            put_field(&mut payload, key.as_bytes());
            payload.put_i64(*n);
        }

        Command::Keys { pattern } => put_field(&mut payload, pattern.as_bytes()),

        Command::SAdd { key, member } | Command::SRem { key, member } => {
            put_field(&mut payload, key.as_bytes());
            put_field(&mut payload, member.as_bytes());
        }

        Command::RandomKey
        | Command::Save
        | Command::BgSave
        | Command::FlushDb
        | Command::FlushAll
        | Command::Ping => {}
    }

    frame(command.command_type() as u8, &payload, "command")
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, payload) = split_frame(bytes, "command")?;

    let cmd_type = CommandType::from_u8(cmd_type).ok_or_else(|| {
        EntityKvError::Protocol(format!("Unknown command type: 0x{:02x}", cmd_type))
    })?;

    let mut fields = FieldReader::new(payload, cmd_type);
    let command = match cmd_type {
        CommandType::Get => Command::Get { key: fields.string()? },
        CommandType::Exists => Command::Exists { key: fields.string()? },
        CommandType::Ttl => Command::Ttl { key: fields.string()? },
        CommandType::SMembers => Command::SMembers { key: fields.string()? },
        CommandType::Type => Command::Type { key: fields.string()? },
        CommandType::Set => Command::Set {
            key: fields.string()?,
            value: fields.bytes()?,
        },
        CommandType::SetNx => Command::SetNx {
            key: fields.string()?,
            value: fields.bytes()?,
        },
        CommandType::GetSet => Command::GetSet {
            key: fields.string()?,
            value: fields.bytes()?,
        },
        CommandType::Delete => Command::Delete { keys: fields.strings()? },
        CommandType::MGet => Command::MGet { keys: fields.strings()? },
        CommandType::IncrBy => Command::IncrBy {
            key: fields.string()?,
            delta: fields.integer()?,
        },
        CommandType::DecrBy => Command::DecrBy {
            key: fields.string()?,
            delta: fields.integer()?,
        },
        CommandType::Expire => Command::Expire {
            key: fields.string()?,
            seconds: fields.integer()?,
        },
        CommandType::ExpireAt => Command::ExpireAt {
            key: fields.string()?,
            timestamp: fields.integer()?,
        },
        CommandType::Keys => Command::Keys { pattern: fields.string()? },
        CommandType::SAdd => Command::SAdd {
            key: fields.string()?,
            member: fields.string()?,
        },
        CommandType::SRem => Command::SRem {
            key: fields.string()?,
            member: fields.string()?,
        },
        CommandType::RandomKey => Command::RandomKey,
        CommandType::Save => Command::Save,
        CommandType::BgSave => Command::BgSave,
        CommandType::FlushDb => Command::FlushDb,
        CommandType::FlushAll => Command::FlushAll,
        CommandType::Ping => Command::Ping,
    };
    fields.finish()?;

    Ok(command)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload.
/// Fails without producing a frame if the payload exceeds [`MAX_PAYLOAD_SIZE`].
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let mut payload = Vec::new();

    match response {
        Response::Ok | Response::Nil => {}
        Response::Integer(n) => payload.put_i64(*n),
        Response::Bulk(bytes) => payload.put_slice(bytes),
        Response::Array(items) => {
            payload.put_u32(items.len() as u32);
            for item in items {
                match item {
                    Some(bytes) => {
                        payload.put_u8(1);
                        put_field(&mut payload, bytes);
                    }
                    None => payload.put_u8(0),
                }
            }
        }
        Response::Error(message) => payload.put_slice(message.as_bytes()),
    }

    frame(response.status() as u8, &payload, "reply")
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, mut payload) = split_frame(bytes, "response")?;

    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::Nil,
        0x02 => Status::Integer,
        0x03 => Status::Bulk,
        0x04 => Status::Array,
        0x05 => Status::Error,
        _ => {
            return Err(EntityKvError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    match status {
        Status::Ok => Ok(Response::Ok),
        Status::Nil => Ok(Response::Nil),
        Status::Integer => {
            if payload.len() != 8 {
                return Err(EntityKvError::Protocol(format!(
                    "INTEGER response: expected 8 bytes, got {}",
                    payload.len()
                )));
            }
            Ok(Response::Integer(payload.get_i64()))
        }
        Status::Bulk => Ok(Response::Bulk(payload.to_vec())),
        Status::Array => {
            if payload.remaining() < 4 {
                return Err(EntityKvError::Protocol(
                    "ARRAY response: missing item count".to_string(),
                ));
            }
            let count = payload.get_u32() as usize;
            let mut items = Vec::with_capacity(count.min(payload.remaining()));
            for _ in 0..count {
                if !payload.has_remaining() {
                    return Err(EntityKvError::Protocol(
                        "ARRAY response: truncated item".to_string(),
                    ));
                }
                match payload.get_u8() {
                    0 => items.push(None),
                    _ => items.push(Some(take_field(&mut payload, "ARRAY response")?)),
                }
            }
            Ok(Response::Array(items))
        }
        Status::Error => Ok(Response::Error(
            String::from_utf8_lossy(payload).into_owned(),
        )),
    }
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let message = read_frame(reader)?;
    decode_command(&message)
}

/// Write a command to a stream; nothing is written if it cannot be encoded
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let message = read_frame(reader)?;
    decode_response(&message)
}

/// Write a response to a stream; nothing is written if it cannot be encoded
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Framing
// =============================================================================

/// Frame a payload, refusing anything the reading side would reject
fn frame(kind: u8, payload: &[u8], what: &str) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_SIZE)
        .ok_or_else(|| {
            EntityKvError::Protocol(format!(
                "{} too large: {} bytes (max {})",
                what,
                payload.len(),
                MAX_PAYLOAD_SIZE
            ))
        })?;

    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(kind);
    message.put_u32(len);
    message.put_slice(payload);
    Ok(message)
}

/// Validate the header and return (kind byte, payload)
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(EntityKvError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let kind = bytes[0];
    let payload_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(EntityKvError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(EntityKvError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((kind, &bytes[HEADER_SIZE..total_len]))
}

/// Read header + payload from a stream
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(EntityKvError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut message = vec![0u8; HEADER_SIZE + payload_len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    if payload_len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }
    Ok(message)
}

// =============================================================================
// Fields
// =============================================================================

// Oversized lengths never reach the wire: `frame` rejects the whole payload
fn put_field(buf: &mut Vec<u8>, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

fn put_strings(buf: &mut Vec<u8>, values: &[String]) {
    buf.put_u32(values.len() as u32);
    for value in values {
        put_field(buf, value.as_bytes());
    }
}

fn take_field(buf: &mut &[u8], context: &str) -> Result<Vec<u8>> {
    if buf.remaining() < 4 {
        return Err(EntityKvError::Protocol(format!(
            "{}: missing field length",
            context
        )));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(EntityKvError::Protocol(format!(
            "{}: incomplete field (expected {}, got {})",
            context,
            len,
            buf.remaining()
        )));
    }
    let data = buf[..len].to_vec();
    buf.advance(len);
    Ok(data)
}

/// Sequential reader over a command payload
struct FieldReader<'a> {
    buf: &'a [u8],
    context: String,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8], cmd_type: CommandType) -> Self {
        Self {
            buf,
            context: format!("{:?} command", cmd_type),
        }
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        take_field(&mut self.buf, &self.context)
    }

    fn string(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes).map_err(|e| {
            EntityKvError::Protocol(format!("{}: field is not UTF-8: {}", self.context, e))
        })
    }

    fn integer(&mut self) -> Result<i64> {
        if self.buf.remaining() < 8 {
            return Err(EntityKvError::Protocol(format!(
                "{}: missing integer",
                self.context
            )));
        }
        Ok(self.buf.get_i64())
    }

    fn strings(&mut self) -> Result<Vec<String>> {
        if self.buf.remaining() < 4 {
            return Err(EntityKvError::Protocol(format!(
                "{}: missing list length",
                self.context
            )));
        }
        let count = self.buf.get_u32() as usize;
        let mut values = Vec::with_capacity(count.min(self.buf.remaining()));
        for _ in 0..count {
            values.push(self.string()?);
        }
        Ok(values)
    }

    /// Reject trailing bytes
    fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(EntityKvError::Protocol(format!(
                "{}: unexpected trailing {} bytes",
                self.context,
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}
