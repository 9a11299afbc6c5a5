// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speckle sync CLI
//!
//! Sends and receives object graphs and inspects the local object cache.
//!
//! # Usage
//!
//! ```bash
//! # Cache of one stream
//! speckle-sync --stream a1b2c3d4 cache stats
//! speckle-sync --stream a1b2c3d4 cache get 0123456789abcdef0123456789abcdef
//!
//! # Send a JSON document as an object graph ('@' keys are detached)
//! speckle-sync --server https://speckle.example --stream a1b2c3d4 --token $TOKEN send model.json
//!
//! # Receive it back
//! speckle-sync --server https://speckle.example --stream a1b2c3d4 receive <root-id> --print
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use speckle_cache::{ObjectCache, SqliteCache};
use speckle_core::node::Base;
use speckle_core::{
    serialize, DeserializePool, Deserializer, Node, SchemaVersion, TypeRegistry, Value,
    WorkerPoolConfig,
};
use speckle_transport::{HttpRemote, SyncClient, TransportConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Speckle object graph sync
#[derive(Parser, Debug)]
#[command(name = "speckle-sync")]
#[command(about = "Send, receive and inspect content-addressed object graphs")]
#[command(version)]
struct Args {
    /// Server base URL
    #[arg(long)]
    server: Option<String>,

    /// Stream (project) id
    #[arg(short, long)]
    stream: Option<String>,

    /// Bearer token for the server
    #[arg(long)]
    token: Option<String>,

    /// Transport configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache database path (default: per-stream file in the user data directory)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Deserialization worker threads (default: CPU count)
    #[arg(long)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect the local object cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Serialize a JSON document and upload it
    Send {
        /// JSON file with an object at the root
        file: PathBuf,
    },

    /// Download an object graph and rebuild it
    Receive {
        /// Root object id
        id: String,

        /// Print the root record
        #[arg(long)]
        print: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Entry count and database location
    Stats,
    /// Print one record
    Get { id: String },
    /// Check whether a record is cached
    Has { id: String },
    /// Remove one record
    Delete { id: String },
    /// List cached ids
    List {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cache = open_cache(&args)?;
    match &args.command {
        Commands::Cache { command } => cmd_cache(cache.as_ref(), command),
        Commands::Send { file } => cmd_send(&args, cache, file).await,
        Commands::Receive { id, print } => cmd_receive(&args, cache, id, *print).await,
    }
}

fn open_cache(args: &Args) -> Result<Arc<SqliteCache>> {
    let cache = match (&args.cache, &args.stream) {
        (Some(path), _) => SqliteCache::open(path)?,
        (None, Some(stream)) => SqliteCache::for_stream(stream)?,
        (None, None) => bail!("either --cache or --stream is required"),
    };
    Ok(Arc::new(cache))
}

fn load_config(args: &Args) -> Result<TransportConfig> {
    match &args.config {
        Some(path) => TransportConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(TransportConfig::default()),
    }
}

fn client(args: &Args, cache: Arc<SqliteCache>) -> Result<SyncClient<HttpRemote>> {
    let (Some(server), Some(stream)) = (&args.server, &args.stream) else {
        bail!("--server and --stream are required");
    };
    let config = load_config(args)?;
    tracing::debug!(server = server.as_str(), stream = stream.as_str(), "remote configured");
    let mut remote = HttpRemote::new(server, stream, &config)?;
    if let Some(token) = &args.token {
        remote = remote.with_token(token);
    }
    Ok(SyncClient::new(Arc::new(remote), cache, config))
}

/// Token cancelled on Ctrl+C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling...");
            trigger.cancel();
        }
    });
    token
}

fn cmd_cache(cache: &SqliteCache, command: &CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Stats => {
            println!("Path:    {}", cache.path().display());
            println!("Objects: {}", cache.count()?);
        }
        CacheCommand::Get { id } => match cache.get(id)? {
            Some(json) => println!("{json}"),
            None => bail!("{id} is not cached"),
        },
        CacheCommand::Has { id } => println!("{}", cache.has(id)?),
        CacheCommand::Delete { id } => {
            if cache.delete(id)? {
                println!("Deleted {id}");
            } else {
                println!("{id} was not cached");
            }
        }
        CacheCommand::List { limit } => {
            let mut ids: Vec<String> = cache.get_all()?.into_iter().map(|(id, _)| id).collect();
            ids.sort_unstable();
            for id in ids.iter().take(*limit) {
                println!("{id}");
            }
            if ids.len() > *limit {
                println!("... {} more", ids.len() - limit);
            }
        }
    }
    Ok(())
}

async fn cmd_send(args: &Args, cache: Arc<SqliteCache>, file: &Path) -> Result<()> {
    let text =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let document: serde_json::Value = serde_json::from_str(&text)?;
    let serde_json::Value::Object(fields) = document else {
        bail!("{} must contain a JSON object at the root", file.display());
    };
    let root = to_base(fields);

    let client = client(args, cache)?;
    let outcome = client.send(&root, &interrupt_token()).await?;

    println!("Root:     {}", outcome.root_id);
    println!("Objects:  {}", outcome.objects);
    println!("Stats:    {}", serde_json::to_string(&outcome.stats)?);
    Ok(())
}

async fn cmd_receive(args: &Args, cache: Arc<SqliteCache>, id: &str, print: bool) -> Result<()> {
    let client = client(args, cache)?;
    let mut pool_config = WorkerPoolConfig::default();
    if let Some(workers) = args.workers {
        pool_config.workers = workers;
    }
    let registry = TypeRegistry::new(SchemaVersion::new(2, 0, 0));
    let pool = DeserializePool::start(Deserializer::new(Arc::new(registry)), &pool_config)
        .context("starting deserialization workers")?;

    let outcome = client.receive(id, &pool, &interrupt_token()).await?;

    println!("Root:     {} ({})", id, outcome.root.speckle_type());
    println!("Objects:  {}", outcome.objects);
    println!("Stats:    {}", serde_json::to_string(&outcome.stats)?);
    if print {
        if let Some(record) = serialize(outcome.root.as_ref())?.next() {
            let pretty: serde_json::Value = serde_json::from_str(&record.json)?;
            println!("{}", serde_json::to_string_pretty(&pretty)?);
        }
    }
    Ok(())
}

/// JSON object to a dynamic node. Nested objects become nodes too.
fn to_base(fields: serde_json::Map<String, serde_json::Value>) -> Base {
    let mut base = match fields.get("speckle_type").and_then(serde_json::Value::as_str) {
        Some(speckle_type) => Base::with_speckle_type(speckle_type),
        None => Base::new(),
    };
    for (key, value) in fields {
        match key.as_str() {
            "id" | "speckle_type" => {}
            "applicationId" => base.application_id = value.as_str().map(str::to_string),
            _ if key.starts_with("__") => {}
            _ => {
                base.set(key, to_value(value));
            }
        }
    }
    base
}

fn to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(to_value).collect()),
        serde_json::Value::Object(fields) => Value::object(to_base(fields)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_document_becomes_graph() {
        let document = serde_json::json!({
            "speckle_type": "Objects.BuiltElements.Level",
            "id": "ignored",
            "__internal": 1,
            "name": "L1",
            "@walls": [{"speckle_type": "Objects.BuiltElements.Wall", "height": 3.5}],
            "tags": ["a", 2]
        });
        let serde_json::Value::Object(fields) = document else {
            unreachable!()
        };
        let root = to_base(fields);

        assert_eq!(root.speckle_type(), "Objects.BuiltElements.Level");
        assert!(root.get("id").is_none());
        assert!(root.get("__internal").is_none());
        assert_eq!(root.get("name"), Some(&Value::from("L1")));

        let records: Vec<_> = serialize(&root).unwrap().collect();
        assert_eq!(records.len(), 2);
        assert!(records[1].json.contains("Objects.BuiltElements.Wall"));
    }

    #[test]
    fn test_cli_parses() {
        let args = Args::try_parse_from([
            "speckle-sync",
            "--stream",
            "abc",
            "receive",
            "0123",
            "--print",
        ])
        .unwrap();
        assert!(matches!(args.command, Commands::Receive { print: true, .. }));

        let args = Args::try_parse_from(["speckle-sync", "--cache", "x.db", "cache", "list", "-l", "5"])
            .unwrap();
        assert!(matches!(
            args.command,
            Commands::Cache {
                command: CacheCommand::List { limit: 5 }
            }
        ));
    }
}
