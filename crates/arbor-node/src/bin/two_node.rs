//! Two in-process routers, connected over a duplex pipe, driven to tree and
//! ring convergence and then exchanging one greedy-routed frame.
//!
//! Stands in for the out-of-scope CLI/simulator: a manually runnable
//! demonstration of the core rather than a production entry point.

use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use tracing::info;

use arbor_codec::FrameBody;
use arbor_node::{connect_duplex, init_tracing, run_maintenance_loop, spawn_router, NodeConfig};

#[derive(Parser)]
#[command(about = "Run two Arbor nodes over an in-process duplex pipe until they converge")]
struct Cli {
    /// Path to a TOML config file shared by both demo nodes.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
    /// Seconds to let the nodes converge before reporting final state.
    #[arg(long, default_value_t = 3)]
    settle_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => NodeConfig::default(),
    };
    init_tracing(&config.default_log_level);

    let node_a = spawn_router(&config);
    let node_b = spawn_router(&config);
    info!(a = %node_a.local_public_key(), b = %node_b.local_public_key(), "generated identities");

    let (port_on_a, port_on_b) = connect_duplex(&node_a, &node_b, 64 * 1024).await?;
    info!(port_on_a, port_on_b, "connected duplex peers");

    tokio::spawn(run_maintenance_loop(node_a.clone(), Duration::from_millis(200)));
    tokio::spawn(run_maintenance_loop(node_b.clone(), Duration::from_millis(200)));

    tokio::time::sleep(Duration::from_secs(cli.settle_secs)).await;

    info!(
        root_a = %node_a.root_public_key(),
        root_b = %node_b.root_public_key(),
        coords_a = ?node_a.local_coordinates(),
        coords_b = ?node_b.local_coordinates(),
        "tree converged"
    );
    info!(
        successor_a = ?node_a.successor_public_key(),
        predecessor_a = ?node_a.predecessor_public_key(),
        successor_b = ?node_b.successor_public_key(),
        predecessor_b = ?node_b.predecessor_public_key(),
        "ring converged"
    );

    let mut delivered_at_b = node_b.delivered();
    node_a.send(FrameBody::Greedy {
        dst: node_b.local_coordinates(),
        src: node_a.local_coordinates(),
        payload: Bytes::from_static(b"hello from node a"),
    });

    match tokio::time::timeout(Duration::from_secs(2), delivered_at_b.recv()).await {
        Ok(Ok(frame)) => {
            let body = frame.body;
            info!(?body, "node b delivered a greedy frame from node a")
        }
        _ => info!("no frame delivered within the timeout"),
    }

    Ok(())
}
