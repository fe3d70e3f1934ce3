//! Server and clients over real WebSocket connections on loopback.

use std::time::Duration;

use cubesync::prelude::*;
use tokio::time::Instant;

const DEADLINE: Duration = Duration::from_secs(5);

async fn start_server() -> (Server<WebSocketServer>, String) {
    let server = Server::builder()
        .bind("127.0.0.1:0")
        .broadcast_interval(Duration::from_millis(50))
        .build()
        .await
        .unwrap();
    let url = format!("ws://{}", server.transport().local_addr());
    (server, url)
}

fn client_config(url: &str) -> ClientConfig {
    ClientConfig {
        server_url: url.to_string(),
        report_interval: Duration::from_millis(50),
        drop_check_interval: Duration::from_millis(100),
        recolor_interval: None,
        ..ClientConfig::default()
    }
}

/// Runs frames every 5 ms until `done` holds or the deadline passes.
async fn run_until(
    server: &mut Server<WebSocketServer>,
    clients: &mut [&mut Client<WebSocketClient, HeadlessRenderer>],
    mut done: impl FnMut(
        &Server<WebSocketServer>,
        &[&mut Client<WebSocketClient, HeadlessRenderer>],
    ) -> bool,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        let now = Instant::now();
        server.update(now);
        for client in clients.iter_mut() {
            client.update(now);
        }
        if done(server, clients) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_two_clients_sync_over_websocket() {
    let (mut server, url) = start_server().await;
    let config = client_config(&url);
    let mut a = Client::connect(&config, HeadlessRenderer::new());
    let mut b = Client::connect(&config, HeadlessRenderer::new());

    let joined = run_until(&mut server, &mut [&mut a, &mut b], |_, clients| {
        clients.iter().all(|c| c.own_id().is_some() && c.registry().len() == 2)
    })
    .await;
    assert!(joined, "clients never saw each other");

    let a_id = a.own_id().cloned().unwrap();
    assert!(a.translate_local(Vec3::new(1.0, 0.0, 0.0)));

    let moved = run_until(&mut server, &mut [&mut a, &mut b], |_, clients| {
        clients[1]
            .registry()
            .get(&a_id)
            .is_some_and(|p| p.position == Vec3::new(1.0, 0.0, 0.0))
    })
    .await;
    assert!(moved, "B never saw A move");

    a.disconnect();
    let dropped = run_until(&mut server, &mut [&mut b], |server, clients| {
        server.registry().len() == 1 && !clients[0].registry().contains(&a_id)
    })
    .await;
    assert!(dropped, "A was never dropped");
    assert!(b.mirror().proxy(&a_id).is_none());

    server.shutdown();
}

#[tokio::test]
async fn test_client_reports_disconnect_when_server_unreachable() {
    // Bind and immediately release a port so nothing is listening on it.
    let (server, url) = start_server().await;
    drop(server);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut client = Client::connect(&client_config(&url), HeadlessRenderer::new());
    let start = Instant::now();
    while client.transport().is_alive() && start.elapsed() < DEADLINE {
        client.update(Instant::now());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    client.update(Instant::now());

    assert!(!client.is_connected());
    assert!(client.own_id().is_none());
}
