//! EntityKV CLI Client
//!
//! Command-line interface for inspecting an EntityKV server.

use clap::{Parser, Subcommand};
use entitykv::{Backend, Config, RemoteBackend};

/// EntityKV CLI
#[derive(Parser, Debug)]
#[command(name = "entitykv-cli")]
#[command(about = "CLI for the EntityKV key-value server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete keys
    Del {
        /// The keys to delete
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List keys matching a glob pattern
    Keys {
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Show remaining time to live in seconds
    Ttl { key: String },

    /// Set a time to live in seconds
    Expire { key: String, seconds: i64 },

    /// Increment an integer key
    Incr {
        key: String,

        #[arg(short, long, default_value = "1")]
        by: i64,
    },

    /// Show the structural type of a key
    Type { key: String },

    /// List the ids tracked for an entity type
    Ids {
        /// Entity type name, e.g. Widget
        type_name: String,
    },

    /// Allocate the next sequence value for an entity type
    NextSeq { type_name: String },

    /// Persist the server's keyspace
    Save,

    /// Ping the server
    Ping,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> entitykv::Result<()> {
    let config = Config::builder().server_addr(&args.server).build();
    let scheme = &config.key_scheme;
    let mut backend = RemoteBackend::connect_with(&config)?;

    match args.command {
        Commands::Get { key } => match backend.get(&key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            backend.set(&key, value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { keys } => println!("(integer) {}", backend.delete(&keys)?),
        Commands::Keys { pattern } => print_list(&backend.keys_matching(&pattern)?),
        Commands::Ttl { key } => println!("(integer) {}", backend.ttl(&key)?),
        Commands::Expire { key, seconds } => {
            println!("(integer) {}", backend.expire(&key, seconds)?)
        }
        Commands::Incr { key, by } => println!("(integer) {}", backend.increment_by(&key, by)?),
        Commands::Type { key } => println!("{}", backend.key_type(&key)?.as_str()),
        Commands::Ids { type_name } => {
            print_list(&backend.set_members(&scheme.id_index_key_for_name(&type_name))?)
        }
        Commands::NextSeq { type_name } => {
            let key = scheme.sequence_key_for_name(&type_name);
            println!("(integer) {}", backend.increment(&key)?)
        }
        Commands::Save => {
            backend.save()?;
            println!("OK");
        }
        Commands::Ping => {
            backend.ping()?;
            println!("PONG");
        }
    }

    Ok(())
}

fn print_list(items: &[String]) {
    if items.is_empty() {
        println!("(empty list)");
    }
    for (i, item) in items.iter().enumerate() {
        println!("{}) {}", i + 1, item);
    }
}
