//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread
//! - Worker thread pool for connections (crossbeam channel)
//! - Commands executed against a shared backend
//! - `RemoteBackend` speaks the same protocol from the client side

mod server;
mod connection;
mod client;

pub use server::{Server, ShutdownHandle};
pub use connection::{execute, Connection};
pub use client::RemoteBackend;
