//! # Arbor Node
//!
//! The ambient stack around the routing core (`arbor-router` and friends):
//! TOML configuration, tracing-subscriber init, and a runnable two-node
//! demo binary. None of this is part of the spanning-tree/virtual-snake
//! core itself — it is the surrounding engineering a deployable node needs.

mod config;
mod error;
mod logging;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use logging::init_tracing;

use std::time::Duration;

use arbor_core::PrivateKey;
use arbor_router::Router;
use arbor_switch::PeerType;

/// Build a freshly keyed [`Router`] from a [`NodeConfig`], the way a
/// long-running node process would at startup.
pub fn spawn_router(config: &NodeConfig) -> Router {
    Router::with_config(
        PrivateKey::generate(),
        config.to_router_config(),
        arbor_core::system_clock(),
    )
}

/// Drive `router`'s periodic maintenance (`tick()`) on a fixed-period
/// `tokio::time::interval`, a single shared timer rather than giving every
/// subsystem its own timer task. Runs until the enclosing task is aborted.
pub async fn run_maintenance_loop(router: Router, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        router.tick();
    }
}

/// Connect two in-process routers over a `tokio::io::duplex` pair, the way
/// the `two_node` demo binary and its integration test do. Both sides are
/// tagged [`PeerType::Remote`] since a duplex pipe has no locality of its own
/// to report.
pub async fn connect_duplex(a: &Router, b: &Router, buffer: usize) -> NodeResult<(u32, u32)> {
    let (side_a, side_b) = tokio::io::duplex(buffer);
    let (port_a, port_b) = tokio::try_join!(
        a.connect(side_a, "duplex", PeerType::Remote),
        b.connect(side_b, "duplex", PeerType::Remote),
    )?;
    Ok((port_a, port_b))
}
