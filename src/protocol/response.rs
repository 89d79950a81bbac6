//! Response definitions
//!
//! Represents replies to clients.

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Nil = 0x01,
    Integer = 0x02,
    Bulk = 0x03,
    Array = 0x04,
    Error = 0x05,
}

/// A reply to send to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command succeeded with nothing to return
    Ok,

    /// Absent value
    Nil,

    /// Integer result (counts, codes, counters)
    Integer(i64),

    /// One byte string
    Bulk(Vec<u8>),

    /// Ordered byte strings, each possibly absent
    Array(Vec<Option<Vec<u8>>>),

    /// Command failed; message from the store
    Error(String),
}

impl Response {
    /// Status byte for this response
    pub fn status(&self) -> Status {
        match self {
            Response::Ok => Status::Ok,
            Response::Nil => Status::Nil,
            Response::Integer(_) => Status::Integer,
            Response::Bulk(_) => Status::Bulk,
            Response::Array(_) => Status::Array,
            Response::Error(_) => Status::Error,
        }
    }

    /// Bulk reply, or Nil when absent
    pub fn optional_bulk(value: Option<Vec<u8>>) -> Self {
        match value {
            Some(bytes) => Response::Bulk(bytes),
            None => Response::Nil,
        }
    }

    /// Array reply of strings
    pub fn strings(values: Vec<String>) -> Self {
        Response::Array(values.into_iter().map(|s| Some(s.into_bytes())).collect())
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Response::Error(message.to_string())
    }
}
