//! End-to-end synchronization between a server and several clients.

use std::time::Duration;

use cubesync::prelude::*;
use cubesync_transport::{MemoryClient, MemoryConnector};
use tokio::time::Instant;

type TestClient = Client<MemoryClient, HeadlessRenderer>;

// =========================================================================
// Harness
// =========================================================================

/// A server over the in-memory transport plus a simulated clock.
struct World {
    server: Server<MemoryNetwork>,
    connector: MemoryConnector,
    t0: Instant,
    now: Instant,
}

impl World {
    fn new() -> Self {
        let net = MemoryNetwork::listen();
        let connector = net.connector();
        let now = Instant::now();
        Self {
            server: Server::new(net, &ServerConfig::default()),
            connector,
            t0: now,
            now,
        }
    }

    fn client(&self) -> TestClient {
        self.client_with(ClientConfig {
            recolor_interval: None,
            ..ClientConfig::default()
        })
    }

    fn client_with(&self, config: ClientConfig) -> TestClient {
        Client::new(self.connector.connect(), HeadlessRenderer::new(), &config)
    }

    /// Runs one frame at `t0 + at_ms`: the server first, then every client.
    fn frame(&mut self, at_ms: u64, clients: &mut [&mut TestClient]) {
        self.now = self.t0 + Duration::from_millis(at_ms);
        self.server.update(self.now);
        for client in clients.iter_mut() {
            client.update(self.now);
        }
    }
}

fn pid(s: &str) -> PlayerId {
    PlayerId::new(s)
}

fn established_players(server: &Server<MemoryNetwork>) -> Vec<PlayerId> {
    let mut ids: Vec<_> = server
        .connections()
        .established()
        .filter_map(|c| c.player_id().cloned())
        .collect();
    ids.sort();
    ids
}

fn registry_players(server: &Server<MemoryNetwork>) -> Vec<PlayerId> {
    server.registry().ids().cloned().collect()
}

// =========================================================================
// Join and report
// =========================================================================

#[test]
fn test_first_client_is_assigned_c1() {
    let mut world = World::new();
    let mut a = world.client();

    world.frame(0, &mut [&mut a]);

    assert_eq!(a.own_id(), Some(&pid("c1")));
    assert!(a.is_connected());
    assert_eq!(registry_players(&world.server), vec![pid("c1")]);
}

#[test]
fn test_reported_state_reaches_server_and_snapshot() {
    let mut world = World::new();
    let mut a = world.client();
    world.frame(0, &mut [&mut a]);

    assert!(a.translate_local(Vec3::new(1.0, 0.0, 0.0)));
    // 200 ms: server broadcasts the stale entry, then A reports.
    world.frame(200, &mut [&mut a]);
    // 400 ms: server applies the report and broadcasts it.
    world.frame(400, &mut [&mut a]);

    let entry = world.server.registry().get(&pid("c1")).unwrap();
    assert_eq!(entry.position, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(entry.color, Color::RED);
}

#[test]
fn test_snapshot_does_not_overwrite_own_proxy() {
    let mut world = World::new();
    let mut a = world.client();
    world.frame(0, &mut [&mut a]);

    a.translate_local(Vec3::new(2.0, 0.0, 0.0));
    // The 200 ms snapshot still says c1 is at the origin.
    world.frame(200, &mut [&mut a]);

    let handle = a.mirror().proxy(&pid("c1")).unwrap();
    assert_eq!(a.renderer().position(handle), Some(Vec3::new(2.0, 0.0, 0.0)));
    assert_eq!(a.renderer().len(), 1);
}

#[test]
fn test_second_client_sees_first_at_reported_position() {
    let mut world = World::new();
    let mut a = world.client();
    world.frame(0, &mut [&mut a]);
    a.translate_local(Vec3::new(1.0, 0.0, 0.0));
    world.frame(200, &mut [&mut a]);
    world.frame(400, &mut [&mut a]);

    let mut b = world.client();
    world.frame(600, &mut [&mut a, &mut b]);

    assert_eq!(b.own_id(), Some(&pid("c2")));
    let handle = b.mirror().proxy(&pid("c1")).expect("proxy for c1");
    assert_eq!(b.renderer().position(handle), Some(Vec3::new(1.0, 0.0, 0.0)));
    assert_eq!(b.renderer().color(handle), Some(Color::RED));
    assert_eq!(b.renderer().len(), 2);

    // A learns about B from the same broadcast.
    assert!(a.mirror().proxy(&pid("c2")).is_some());
}

// =========================================================================
// Departure
// =========================================================================

#[test]
fn test_departed_player_is_removed_everywhere() {
    let mut world = World::new();
    let mut a = world.client();
    let mut b = world.client();
    world.frame(0, &mut [&mut a, &mut b]);
    world.frame(200, &mut [&mut a, &mut b]);
    assert!(b.mirror().proxy(&pid("c1")).is_some());

    a.disconnect();
    // Server notices on its next frame.
    world.frame(300, &mut [&mut b]);
    assert_eq!(registry_players(&world.server), vec![pid("c2")]);

    // The 400 ms broadcast omits c1, but B only drops on its drop check.
    world.frame(400, &mut [&mut b]);
    assert!(!b.mirror().was_seen(&pid("c1")));
    assert!(b.mirror().proxy(&pid("c1")).is_some());

    // B's drop check started at 0 ms with a 1 s interval.
    world.frame(1000, &mut [&mut b]);
    assert!(b.mirror().proxy(&pid("c1")).is_none());
    assert!(!b.registry().contains(&pid("c1")));
    assert_eq!(b.renderer().len(), 1);
}

#[test]
fn test_disconnected_client_keeps_mirror_but_loses_identity() {
    let mut world = World::new();
    let mut a = world.client();
    let mut b = world.client();
    world.frame(0, &mut [&mut a, &mut b]);
    world.frame(200, &mut [&mut a, &mut b]);

    a.disconnect();

    assert!(a.own_id().is_none());
    assert!(!a.is_connected());
    assert!(a.registry().contains(&pid("c2")));
    assert!(!a.translate_local(Vec3::new(1.0, 0.0, 0.0)));
}

#[test]
fn test_server_shutdown_disconnects_clients() {
    let mut world = World::new();
    let mut a = world.client();
    world.frame(0, &mut [&mut a]);

    world.server.shutdown();
    a.update(world.now);

    assert!(a.own_id().is_none());
    assert!(!a.is_connected());
    assert!(world.server.registry().is_empty());
}

// =========================================================================
// Invariants
// =========================================================================

#[test]
fn test_registry_matches_established_connections_throughout() {
    let mut world = World::new();
    let mut a = world.client();
    let mut b = world.client();
    let mut c = world.client();

    world.frame(0, &mut [&mut a, &mut b, &mut c]);
    assert_eq!(registry_players(&world.server), established_players(&world.server));
    assert_eq!(world.server.registry().len(), 3);

    b.disconnect();
    world.frame(100, &mut [&mut a, &mut c]);
    assert_eq!(registry_players(&world.server), established_players(&world.server));
    assert_eq!(registry_players(&world.server), vec![pid("c1"), pid("c3")]);

    let mut d = world.client();
    world.frame(200, &mut [&mut a, &mut c, &mut d]);
    assert_eq!(d.own_id(), Some(&pid("c4")));
    assert_eq!(registry_players(&world.server), established_players(&world.server));
}

#[test]
fn test_every_client_converges_to_same_player_set() {
    let mut world = World::new();
    let mut a = world.client();
    let mut b = world.client();
    let mut c = world.client();

    for at_ms in (0..=1200).step_by(100) {
        world.frame(at_ms, &mut [&mut a, &mut b, &mut c]);
    }

    let expected = vec![pid("c1"), pid("c2"), pid("c3")];
    for client in [&a, &b, &c] {
        let ids: Vec<_> = client.registry().ids().cloned().collect();
        assert_eq!(ids, expected);
        assert_eq!(client.renderer().len(), 3);
    }
}

#[test]
fn test_recolor_reaches_other_clients() {
    let mut world = World::new();
    let mut a = world.client_with(ClientConfig {
        recolor_interval: Some(Duration::from_millis(100)),
        ..ClientConfig::default()
    });
    let mut b = world.client();

    for at_ms in (0..=600).step_by(100) {
        world.frame(at_ms, &mut [&mut a, &mut b]);
    }

    let own = a.mirror().proxy(&pid("c1")).unwrap();
    let a_color = a.renderer().color(own).unwrap();
    assert_ne!(a_color, Color::RED);
    assert_eq!(a_color.a, 1.0);

    let seen_by_b = b.registry().get(&pid("c1")).unwrap().color;
    assert_ne!(seen_by_b, Color::RED);
    assert_eq!(seen_by_b.a, 1.0);
}

#[test]
fn test_client_without_server_reports_disconnect() {
    let net = MemoryNetwork::listen();
    let connector = net.connector();
    drop(net);

    let mut client = Client::new(
        connector.connect(),
        HeadlessRenderer::new(),
        &ClientConfig::default(),
    );
    client.update(Instant::now());

    assert!(!client.is_connected());
    assert!(client.own_id().is_none());
    assert!(client.renderer().is_empty());
}
