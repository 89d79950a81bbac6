//! TCP Server
//!
//! Accepts connections and dispatches them to worker threads over a bounded
//! crossbeam channel. Each worker serves one connection at a time against
//! its own clone of the backend.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, TrySendError};

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{EntityKvError, Result};

use super::Connection;

/// How often the acceptor checks the shutdown flag when idle
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cloneable handle that stops a running [`Server`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the server to stop accepting and drain its workers
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// TCP server for EntityKV
pub struct Server<B> {
    config: Config,
    backend: B,
    listener: Option<TcpListener>,
    shutdown: ShutdownHandle,
}

impl<B: Backend + Clone + Send + 'static> Server<B> {
    /// Create a new server with the given config and backend
    pub fn new(config: Config, backend: B) -> Self {
        Self {
            config,
            backend,
            listener: None,
            shutdown: ShutdownHandle::default(),
        }
    }

    /// Bind the listen address; returns the bound address (useful with port 0)
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            EntityKvError::Network(format!("Failed to bind {}: {}", self.config.listen_addr, e))
        })?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Address the server is bound to, if bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Handle for stopping the server from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind()?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| EntityKvError::Network("listener not bound".to_string()))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let (sender, receiver) = channel::bounded::<TcpStream>(self.config.max_connections.max(1));
        let workers = self.spawn_workers(receiver)?;

        tracing::info!(
            "Listening on {} with {} workers",
            addr,
            workers.len()
        );

        while !self.shutdown.is_shutdown() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!("Dropping {}: {}", peer, e);
                        continue;
                    }
                    match sender.try_send(stream) {
                        Ok(()) => tracing::trace!("Queued connection from {}", peer),
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!("Rejecting {}: connection queue full", peer)
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => tracing::warn!("Accept failed: {}", e),
            }
        }

        tracing::info!("Shutting down, waiting for workers");
        drop(sender);
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }

        Ok(())
    }

    fn spawn_workers(&self, receiver: Receiver<TcpStream>) -> Result<Vec<JoinHandle<()>>> {
        let count = self.config.worker_threads.max(1);
        let mut workers = Vec::with_capacity(count);

        for id in 0..count {
            let receiver = receiver.clone();
            let backend = self.backend.clone();
            let read_ms = self.config.read_timeout_ms;
            let write_ms = self.config.write_timeout_ms;

            let handle = thread::Builder::new()
                .name(format!("entitykv-worker-{}", id))
                .spawn(move || {
                    for stream in receiver.iter() {
                        serve(stream, backend.clone(), read_ms, write_ms);
                    }
                })?;
            workers.push(handle);
        }

        Ok(workers)
    }
}

fn serve<B: Backend>(stream: TcpStream, backend: B, read_ms: u64, write_ms: u64) {
    let mut connection = match Connection::new(stream, backend) {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!("Failed to set up connection: {}", e);
            return;
        }
    };

    if let Err(e) = connection.set_timeouts(read_ms, write_ms) {
        tracing::warn!("Failed to set timeouts for {}: {}", connection.peer_addr(), e);
    }
    if let Err(e) = connection.handle() {
        tracing::debug!("Connection {} closed with error: {}", connection.peer_addr(), e);
    }
}
