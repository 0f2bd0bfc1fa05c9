//! Opal node binary.
//!
//! Wires one replica engine to its durability directory and the
//! broadcast layer, then serves until interrupted. Peer membership
//! comes from `--peers` or the `OPAL_PEERS` environment variable as a
//! comma-separated replica list; the in-process hub stands in for the
//! remote transport, which plugs in behind the same `Transport` seam.

use anyhow::Context;
use clap::Parser;
use opal_engine::{spawn, EngineConfig, ReplicaEngine};
use opal_net::{Broadcaster, MemoryHub, StaticMembership};
use opal_wal::LogConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "opal", about = "A causally consistent CRDT key-value store")]
struct Args {
    /// Stable identifier of this replica.
    #[arg(long)]
    replica_id: String,

    /// Directory for the operation log and snapshot.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Batches between automatic snapshots (0 disables them).
    #[arg(long, default_value_t = 100)]
    snapshot_interval: u64,

    /// Maximum bytes per log segment.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    segment_max_bytes: u64,

    /// Log segments retained before recycling.
    #[arg(long, default_value_t = 4)]
    segment_retain: usize,

    /// Deadline in milliseconds for causally gated requests.
    #[arg(long)]
    wait_deadline_ms: Option<u64>,

    /// Comma-separated replica ids forming the cluster.
    #[arg(long, env = "OPAL_PEERS", default_value = "")]
    peers: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let membership = Arc::new(StaticMembership::from_peer_list(
        &args.replica_id,
        &args.peers,
    ));
    let hub = MemoryHub::new();
    let broadcaster = Broadcaster::spawn(
        args.replica_id.clone(),
        membership,
        Arc::new(hub.transport()),
    );

    let config = EngineConfig {
        data_dir: args.data_dir.join(&args.replica_id),
        snapshot_interval: args.snapshot_interval,
        log: LogConfig {
            segment_max_bytes: args.segment_max_bytes,
            segment_retain: args.segment_retain,
        },
        wait_deadline: args.wait_deadline_ms.map(Duration::from_millis),
        dedup_capacity: 4096,
    };

    let engine = ReplicaEngine::open(args.replica_id.clone(), config, broadcaster)
        .with_context(|| format!("opening replica {}", args.replica_id))?;
    let inbox = hub.subscribe(&args.replica_id);
    let replica = spawn(engine, inbox);

    let stats = replica.stats().await.context("replica stats")?;
    info!(
        replica = %args.replica_id,
        objects = stats.object_count,
        log_sequence = stats.log_sequence,
        "replica serving"
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!(replica = %args.replica_id, "shutting down; writing final snapshot");
    replica.snapshot().await.context("final snapshot")?;

    Ok(())
}
