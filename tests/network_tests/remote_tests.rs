//! Network Tests
//!
//! Runs a real server on a loopback port and drives it with RemoteBackend.

use std::thread::{self, JoinHandle};

use entitykv::backend::{Backend, KeyType, MemoryBackend};
use entitykv::keys::Entity;
use entitykv::network::{Server, ShutdownHandle};
use entitykv::{Config, EntityKvError, RemoteBackend, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    id: String,
    name: String,
}

impl Entity for Widget {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    addr: String,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<Result<()>>>,
}

impl TestServer {
    fn start(backend: MemoryBackend) -> Self {
        let config = Config::builder()
            .listen_addr("127.0.0.1:0")
            .worker_threads(4)
            .build();
        let mut server = Server::new(config, backend);
        let addr = server.bind().unwrap().to_string();
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || server.run());

        Self {
            addr,
            shutdown,
            thread: Some(thread),
        }
    }

    fn connect(&self) -> RemoteBackend {
        RemoteBackend::connect(&self.addr).unwrap()
    }

    fn stop(mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap().unwrap();
        }
    }
}

fn widget(id: &str, name: &str) -> Widget {
    Widget {
        id: id.to_string(),
        name: name.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_ping() {
    let server = TestServer::start(MemoryBackend::new());
    let mut client = server.connect();

    client.ping().unwrap();
    assert_eq!(client.peer_addr(), server.addr);

    drop(client);
    server.stop();
}

#[test]
fn test_primitives_over_tcp() {
    let server = TestServer::start(MemoryBackend::new());
    let mut client = server.connect();

    client.set("k", b"v").unwrap();
    assert_eq!(client.get("k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(client.get("missing").unwrap(), None);
    assert_eq!(client.set_if_not_exists("k", b"other").unwrap(), 0);
    assert_eq!(client.exists("k").unwrap(), 1);
    assert_eq!(client.increment_by("n", 5).unwrap(), 5);
    assert_eq!(client.decrement("n").unwrap(), 4);
    assert_eq!(client.ttl("k").unwrap(), -1);
    assert_eq!(client.expire("k", 30).unwrap(), 1);
    assert!(client.ttl("k").unwrap() > 0);
    assert_eq!(
        client.multi_get(&["k".to_string(), "nope".to_string()]).unwrap(),
        vec![Some(b"v".to_vec()), None]
    );
    assert_eq!(
        client.keys_matching("*").unwrap(),
        vec!["k".to_string(), "n".to_string()]
    );
    assert_eq!(client.key_type("k").unwrap(), KeyType::String);
    assert_eq!(client.delete(&["k".to_string(), "n".to_string()]).unwrap(), 2);
    assert_eq!(client.random_key().unwrap(), None);

    drop(client);
    server.stop();
}

#[test]
fn test_typed_store_over_tcp() {
    let server = TestServer::start(MemoryBackend::new());
    let mut client = server.connect();
    {
        let mut widgets = client.typed::<Widget>();

        widgets.store(&widget("7", "a")).unwrap();
        assert_eq!(widgets.get_by_id("7").unwrap(), Some(widget("7", "a")));
        assert_eq!(widgets.get_all().unwrap(), vec![widget("7", "a")]);
        assert_eq!(widgets.next_sequence().unwrap(), 1);

        widgets.delete_by_id("7").unwrap();
        assert!(widgets.get_all().unwrap().is_empty());
    }
    assert_eq!(client.key_type("ids:Widget").unwrap(), KeyType::None);

    drop(client);
    server.stop();
}

#[test]
fn test_server_error_propagates() {
    let server = TestServer::start(MemoryBackend::new());
    let mut client = server.connect();
    client.set_add("s", "m").unwrap();

    let err = client.get("s").unwrap_err();
    match err {
        EntityKvError::Backend(message) => assert!(message.starts_with("WRONGTYPE")),
        other => panic!("expected backend error, got {:?}", other),
    }

    // Connection stays usable after an error reply
    client.ping().unwrap();

    drop(client);
    server.stop();
}

#[test]
fn test_oversized_reply_becomes_error() {
    let server = TestServer::start(MemoryBackend::new());
    let mut client = server.connect();
    let big = "x".repeat(9 * 1024 * 1024);
    {
        let mut widgets = client.typed::<Widget>();
        widgets.store(&widget("1", &big)).unwrap();
        widgets.store(&widget("2", &big)).unwrap();

        // Each payload fits in a frame, both together do not
        match widgets.get_all().unwrap_err() {
            EntityKvError::Backend(message) => assert!(message.contains("too large")),
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    // The stream is still aligned on the same connection
    client.ping().unwrap();
    let mut ids = client.set_members("ids:Widget").unwrap();
    ids.sort();
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(
        client.typed::<Widget>().get_by_id("2").unwrap(),
        Some(widget("2", &big))
    );

    drop(client);
    server.stop();
}

#[test]
fn test_oversized_command_refused_locally() {
    let server = TestServer::start(MemoryBackend::new());
    let mut client = server.connect();
    let huge = vec![b'x'; 17 * 1024 * 1024];

    assert!(matches!(
        client.set("huge", &huge),
        Err(EntityKvError::Protocol(_))
    ));

    client.ping().unwrap();
    assert_eq!(client.exists("huge").unwrap(), 0);

    drop(client);
    server.stop();
}

#[test]
fn test_clients_share_keyspace() {
    let backend = MemoryBackend::new();
    let server = TestServer::start(backend.clone());
    let mut writer = server.connect();
    let mut reader = server.connect();

    writer.typed::<Widget>().store(&widget("1", "shared")).unwrap();

    assert_eq!(
        reader.typed::<Widget>().get_by_id("1").unwrap(),
        Some(widget("1", "shared"))
    );
    assert_eq!(backend.len(), 2);

    drop(writer);
    drop(reader);
    server.stop();
}

#[test]
fn test_concurrent_sequences() {
    let server = TestServer::start(MemoryBackend::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mut client = server.connect();
            thread::spawn(move || {
                (0..25)
                    .map(|_| client.typed::<Widget>().next_sequence().unwrap())
                    .collect::<Vec<i64>>()
            })
        })
        .collect();

    let mut all: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort();

    assert_eq!(all, (1..=100).collect::<Vec<i64>>());
    server.stop();
}

#[test]
fn test_connect_with_config() {
    let server = TestServer::start(MemoryBackend::new());
    let config = Config::builder()
        .server_addr(server.addr.clone())
        .read_timeout_ms(2000)
        .build();

    let mut client = RemoteBackend::connect_with(&config).unwrap();
    client.ping().unwrap();

    drop(client);
    server.stop();
}

#[test]
fn test_connect_refused() {
    // Bind then drop to get a port with no listener
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .to_string();

    assert!(matches!(
        RemoteBackend::connect(&addr),
        Err(EntityKvError::Network(_))
    ));
}
