//! Command definitions
//!
//! One command per backend primitive.

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Set = 0x02,
    Delete = 0x03,
    Ping = 0x04,
    SetNx = 0x05,
    GetSet = 0x06,
    Exists = 0x07,
    IncrBy = 0x08,
    DecrBy = 0x09,
    Expire = 0x0A,
    ExpireAt = 0x0B,
    Ttl = 0x0C,
    Keys = 0x0D,
    MGet = 0x0E,
    SAdd = 0x0F,
    SRem = 0x10,
    SMembers = 0x11,
    Type = 0x12,
    RandomKey = 0x13,
    Save = 0x14,
    BgSave = 0x15,
    FlushDb = 0x16,
    FlushAll = 0x17,
}

impl CommandType {
    /// Parse a command byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        use CommandType::*;
        Some(match byte {
            0x01 => Get,
            0x02 => Set,
            0x03 => Delete,
            0x04 => Ping,
            0x05 => SetNx,
            0x06 => GetSet,
            0x07 => Exists,
            0x08 => IncrBy,
            0x09 => DecrBy,
            0x0A => Expire,
            0x0B => ExpireAt,
            0x0C => Ttl,
            0x0D => Keys,
            0x0E => MGet,
            0x0F => SAdd,
            0x10 => SRem,
            0x11 => SMembers,
            0x12 => Type,
            0x13 => RandomKey,
            0x14 => Save,
            0x15 => BgSave,
            0x16 => FlushDb,
            0x17 => FlushAll,
            _ => return None,
        })
    }

    /// Command name as used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            CommandType::Get => "GET",
            CommandType::Set => "SET",
            CommandType::Delete => "DEL",
            CommandType::Ping => "PING",
            CommandType::SetNx => "SETNX",
            CommandType::GetSet => "GETSET",
            CommandType::Exists => "EXISTS",
            CommandType::IncrBy => "INCRBY",
            CommandType::DecrBy => "DECRBY",
            CommandType::Expire => "EXPIRE",
            CommandType::ExpireAt => "EXPIREAT",
            CommandType::Ttl => "TTL",
            CommandType::Keys => "KEYS",
            CommandType::MGet => "MGET",
            CommandType::SAdd => "SADD",
            CommandType::SRem => "SREM",
            CommandType::SMembers => "SMEMBERS",
            CommandType::Type => "TYPE",
            CommandType::RandomKey => "RANDOMKEY",
            CommandType::Save => "SAVE",
            CommandType::BgSave => "BGSAVE",
            CommandType::FlushDb => "FLUSHDB",
            CommandType::FlushAll => "FLUSHALL",
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: String },
    Set { key: String, value: Vec<u8> },
    SetNx { key: String, value: Vec<u8> },
    GetSet { key: String, value: Vec<u8> },
    Exists { key: String },
    Delete { keys: Vec<String> },
    IncrBy { key: String, delta: i64 },
    DecrBy { key: String, delta: i64 },
    Expire { key: String, seconds: i64 },
    ExpireAt { key: String, timestamp: i64 },
    Ttl { key: String },
    Keys { pattern: String },
    MGet { keys: Vec<String> },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    SMembers { key: String },
    Type { key: String },
    RandomKey,
    Save,
    BgSave,
    FlushDb,
    FlushAll,

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Set { .. } => CommandType::Set,
            Command::SetNx { .. } => CommandType::SetNx,
            Command::GetSet { .. } => CommandType::GetSet,
            Command::Exists { .. } => CommandType::Exists,
            Command::Delete { .. } => CommandType::Delete,
            Command::IncrBy { .. } => CommandType::IncrBy,
            Command::DecrBy { .. } => CommandType::DecrBy,
            Command::Expire { .. } => CommandType::Expire,
            Command::ExpireAt { .. } => CommandType::ExpireAt,
            Command::Ttl { .. } => CommandType::Ttl,
            Command::Keys { .. } => CommandType::Keys,
            Command::MGet { .. } => CommandType::MGet,
            Command::SAdd { .. } => CommandType::SAdd,
            Command::SRem { .. } => CommandType::SRem,
            Command::SMembers { .. } => CommandType::SMembers,
            Command::Type { .. } => CommandType::Type,
            Command::RandomKey => CommandType::RandomKey,
            Command::Save => CommandType::Save,
            Command::BgSave => CommandType::BgSave,
            Command::FlushDb => CommandType::FlushDb,
            Command::FlushAll => CommandType::FlushAll,
            Command::Ping => CommandType::Ping,
        }
    }
}
