//! End-to-end convergence scenarios: root election, tree coordinates on a
//! line topology, greedy delivery, and virtual-snake ring formation, each
//! wired over real `tokio::io::duplex` connections and driven by the same
//! periodic `tick()` a production node would call from a maintenance loop.

use std::time::Duration;

use bytes::Bytes;

use arbor_codec::FrameBody;
use arbor_core::{system_clock, PrivateKey};
use arbor_router::{Router, RouterConfig};
use arbor_switch::PeerType;

fn fast_config() -> RouterConfig {
    RouterConfig {
        port_table_capacity: 16,
        queue_depth: 64,
        announce_deadline: Duration::from_millis(50),
        announcement_interval: Duration::from_millis(30),
        announcement_timeout: Duration::from_millis(300),
        bootstrap_interval: Duration::from_millis(30),
    }
}

fn key(byte: u8) -> PrivateKey {
    PrivateKey::from_bytes([byte; 32])
}

async fn connect(a: &Router, b: &Router) -> (u32, u32) {
    let (side_a, side_b) = tokio::io::duplex(64 * 1024);
    tokio::try_join!(
        a.connect(side_a, "test", PeerType::Remote),
        b.connect(side_b, "test", PeerType::Remote),
    )
    .expect("both sides of a fresh duplex connection should attach cleanly")
}

/// Spawn a periodic `tick()` loop for every given router; the returned
/// guards abort the loops (and hence free the spawned tasks) on drop.
struct TickGuards(Vec<tokio::task::JoinHandle<()>>);

impl Drop for TickGuards {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

fn drive_ticks(routers: &[Router]) -> TickGuards {
    let handles = routers
        .iter()
        .cloned()
        .map(|router| {
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    router.tick();
                }
            })
        })
        .collect();
    TickGuards(handles)
}

/// Poll `condition` until it returns true or `timeout` elapses.
async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_node_root_election() {
    let key_a = key(0x01);
    let key_b = key(0xFF);
    let public_b = key_b.public();

    let router_a = Router::with_config(key_a, fast_config(), system_clock());
    let router_b = Router::with_config(key_b, fast_config(), system_clock());

    let (port_a, _port_b) = connect(&router_a, &router_b).await;
    let _ticks = drive_ticks(&[router_a.clone(), router_b.clone()]);

    let converged = wait_until(Duration::from_secs(3), || {
        router_a.root_public_key() == public_b && router_b.root_public_key() == public_b
    })
    .await;
    assert!(converged, "both nodes should converge on the higher-keyed root");

    assert_eq!(router_b.local_coordinates(), Vec::<u32>::new());
    assert_eq!(router_a.local_coordinates(), vec![port_a]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn line_topology_coordinates() {
    // A < B < C by byte order.
    let key_a = key(0x01);
    let key_b = key(0x80);
    let key_c = key(0xFF);
    let public_c = key_c.public();

    let router_a = Router::with_config(key_a, fast_config(), system_clock());
    let router_b = Router::with_config(key_b, fast_config(), system_clock());
    let router_c = Router::with_config(key_c, fast_config(), system_clock());

    let (port_a_ab, port_b_ab) = connect(&router_a, &router_b).await;
    let (_port_b_bc, _port_c_bc) = connect(&router_b, &router_c).await;
    let _ticks = drive_ticks(&[router_a.clone(), router_b.clone(), router_c.clone()]);

    let converged = wait_until(Duration::from_secs(3), || {
        router_a.root_public_key() == public_c
            && router_b.root_public_key() == public_c
            && router_c.root_public_key() == public_c
    })
    .await;
    assert!(converged, "all three nodes should converge on C as root");

    assert_eq!(router_c.local_coordinates(), Vec::<u32>::new());
    // B's coordinates are `[Q]` where Q is the port C used when forwarding
    // toward B; A's extend B's by the port B used toward A.
    let b_coords = router_b.local_coordinates();
    assert_eq!(b_coords.len(), 1);
    let a_coords = router_a.local_coordinates();
    assert_eq!(a_coords, [b_coords.as_slice(), &[port_b_ab]].concat());
    assert_eq!(a_coords.last().copied(), Some(port_b_ab));
    let _ = port_a_ab;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn greedy_delivery_reaches_the_coordinate_owner() {
    let key_a = key(0x01);
    let key_b = key(0x80);
    let key_c = key(0xFF);

    let router_a = Router::with_config(key_a, fast_config(), system_clock());
    let router_b = Router::with_config(key_b, fast_config(), system_clock());
    let router_c = Router::with_config(key_c, fast_config(), system_clock());

    connect(&router_a, &router_b).await;
    connect(&router_b, &router_c).await;
    let _ticks = drive_ticks(&[router_a.clone(), router_b.clone(), router_c.clone()]);

    wait_until(Duration::from_secs(3), || {
        !router_a.local_coordinates().is_empty() && router_c.local_coordinates().is_empty()
    })
    .await;

    let mut delivered_at_c = router_c.delivered();
    router_a.send(FrameBody::Greedy {
        dst: Vec::new(),
        src: router_a.local_coordinates(),
        payload: Bytes::from_static(b"ping"),
    });

    let frame = tokio::time::timeout(Duration::from_secs(2), delivered_at_c.recv())
        .await
        .expect("greedy frame should be delivered within the timeout")
        .expect("delivery channel should not close mid-test");

    match frame.body {
        FrameBody::Greedy { payload, .. } => assert_eq!(payload.as_ref(), b"ping"),
        other => panic!("expected a delivered Greedy frame, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ring_forms_over_a_four_node_line() {
    let key_1 = key(0x10);
    let key_2 = key(0x40);
    let key_3 = key(0x80);
    let key_4 = key(0xF0);

    let router_1 = Router::with_config(key_1, fast_config(), system_clock());
    let router_2 = Router::with_config(key_2, fast_config(), system_clock());
    let router_3 = Router::with_config(key_3, fast_config(), system_clock());
    let router_4 = Router::with_config(key_4, fast_config(), system_clock());

    connect(&router_1, &router_2).await;
    connect(&router_2, &router_3).await;
    connect(&router_3, &router_4).await;
    let _ticks = drive_ticks(&[
        router_1.clone(),
        router_2.clone(),
        router_3.clone(),
        router_4.clone(),
    ]);

    let public_1 = key_1.public();
    let public_2 = key_2.public();
    let public_3 = key_3.public();
    let public_4 = key_4.public();

    let converged = wait_until(Duration::from_secs(5), || {
        router_2.predecessor_public_key() == Some(public_1)
            && router_2.successor_public_key() == Some(public_3)
            && router_1.predecessor_public_key() == Some(public_4)
            && router_4.successor_public_key() == Some(public_1)
    })
    .await;

    assert!(
        converged,
        "ring should converge: 2's neighbours are {:?}/{:?}, 1's predecessor is {:?}, 4's successor is {:?}",
        router_2.predecessor_public_key(),
        router_2.successor_public_key(),
        router_1.predecessor_public_key(),
        router_4.successor_public_key(),
    );

    // Duality: whichever node B considers its successor should consider B
    // its predecessor.
    assert_eq!(router_3.predecessor_public_key(), Some(public_2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parent_disconnect_triggers_rerooting() {
    let key_a = key(0x01);
    let key_b = key(0x80);
    let key_c = key(0xFF);

    let router_a = Router::with_config(key_a, fast_config(), system_clock());
    let router_b = Router::with_config(key_b, fast_config(), system_clock());
    let router_c = Router::with_config(key_c, fast_config(), system_clock());

    let (port_a_ab, _port_b_ab) = connect(&router_a, &router_b).await;
    let (port_b_bc, _port_c_bc) = connect(&router_b, &router_c).await;
    let _ticks = drive_ticks(&[router_a.clone(), router_b.clone(), router_c.clone()]);

    wait_until(Duration::from_secs(3), || {
        router_a.root_public_key() == key_c.public()
    })
    .await;

    // C (the root) drops off the network entirely.
    router_b.disconnect(port_b_bc, "test teardown").await.unwrap();

    let rerooted = wait_until(Duration::from_secs(3), || router_b.root_public_key() == key_b.public())
        .await;
    assert!(rerooted, "B should become its own root once C disappears");

    // A re-derives its coordinates from B's new self-rooted announcement.
    let a_rerooted = wait_until(Duration::from_secs(3), || {
        router_a.root_public_key() == key_b.public() && router_a.local_coordinates() == vec![port_a_ab]
    })
    .await;
    assert!(a_rerooted, "A should follow B's re-election");
}
