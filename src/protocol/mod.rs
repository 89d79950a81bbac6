//! Protocol Module
//!
//! Defines the wire protocol between `RemoteBackend` and `entitykv-server`.
//!
//! ## Protocol Format (V2 - Simple Binary)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01 GET, 0x02 SET, 0x03 DEL, 0x04 PING
//! - 0x05 SETNX, 0x06 GETSET, 0x07 EXISTS
//! - 0x08 INCRBY, 0x09 DECRBY
//! - 0x0A EXPIRE, 0x0B EXPIREAT, 0x0C TTL
//! - 0x0D KEYS, 0x0E MGET
//! - 0x0F SADD, 0x10 SREM, 0x11 SMEMBERS
//! - 0x12 TYPE, 0x13 RANDOMKEY
//! - 0x14 SAVE, 0x15 BGSAVE, 0x16 FLUSHDB, 0x17 FLUSHALL
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NIL
//! - 0x02: INTEGER
//! - 0x03: BULK
//! - 0x04: ARRAY
//! - 0x05: ERROR

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
