//! End-to-end tunnels through the local client.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use chained_client::balancer::ReconfigureOutcome;
use chained_client::config::{ChainedServerConfig, ClientConfig};
use chained_client::net::Listener;
use chained_client::{Client, Shutdown};

mod common;

fn client_config(servers: &[SocketAddr]) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.device_id = "device-42".into();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.balancer.dial_timeout_secs = 2;
    config.chained_servers = servers
        .iter()
        .map(|addr| ChainedServerConfig {
            addr: addr.to_string(),
            auth_token: "s3cret".into(),
            ..Default::default()
        })
        .collect();
    config
}

struct Running {
    local: SocketAddr,
    client: Arc<Client>,
    updates: mpsc::UnboundedSender<ClientConfig>,
    shutdown: Shutdown,
    task: tokio::task::JoinHandle<()>,
}

async fn start_client(config: ClientConfig) -> Running {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let local = listener.local_addr().unwrap();

    let client = Arc::new(Client::new(config.clone()));
    client.apply_config(config);

    let (updates, rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(client.clone().run(listener, rx, shutdown.clone()));

    Running {
        local,
        client,
        updates,
        shutdown,
        task,
    }
}

/// Open a tunnel to `target` through the local client and return the status line.
async fn open_tunnel(local: SocketAddr, target: SocketAddr) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(local).await.unwrap();
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = common::read_head(&mut stream).await.unwrap_or_default();
    let status = head.lines().next().unwrap_or_default().to_string();
    (stream, status)
}

async fn assert_echo(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, payload);
}

#[tokio::test]
async fn tunnels_through_chained_server() {
    let echo = common::start_echo_server().await;
    let chained = common::start_chained_server(200).await;
    let running = start_client(client_config(&[chained.addr])).await;

    let (mut stream, status) = open_tunnel(running.local, echo).await;
    assert!(status.contains(" 200 "), "unexpected status: {status}");
    assert_echo(&mut stream, b"ping through the tunnel").await;

    let head = chained.last_head.lock().await.clone();
    assert!(head.starts_with(&format!("CONNECT {echo} HTTP/1.1")));
    assert!(head.contains("X-Lantern-Device-Id: device-42"));
    assert!(head.contains("X-Lantern-Auth-Token: s3cret"));

    drop(stream);
    running.shutdown.trigger();
    running.task.await.unwrap();
}

#[tokio::test]
async fn fails_over_to_next_chained_server() {
    let echo = common::start_echo_server().await;
    let chained = common::start_chained_server(200).await;
    let dead = common::unused_addr();
    let running = start_client(client_config(&[dead, chained.addr])).await;

    for _ in 0..3 {
        let (mut stream, status) = open_tunnel(running.local, echo).await;
        assert!(status.contains(" 200 "), "unexpected status: {status}");
        assert_echo(&mut stream, b"hello").await;
    }
    assert_eq!(chained.connects.load(Ordering::SeqCst), 3);

    running.shutdown.trigger();
}

#[tokio::test]
async fn rejected_connect_becomes_bad_gateway() {
    let echo = common::start_echo_server().await;
    let refusing = common::start_chained_server(403).await;
    let running = start_client(client_config(&[refusing.addr])).await;

    let (_stream, status) = open_tunnel(running.local, echo).await;
    assert!(status.contains(" 502 "), "unexpected status: {status}");

    running.shutdown.trigger();
}

#[tokio::test]
async fn reload_moves_new_tunnels_and_keeps_open_ones() {
    let echo = common::start_echo_server().await;
    let first = common::start_chained_server(200).await;
    let second = common::start_chained_server(200).await;
    let running = start_client(client_config(&[first.addr])).await;

    let (mut old_tunnel, status) = open_tunnel(running.local, echo).await;
    assert!(status.contains(" 200 "));
    let old_balancer = running.client.manager().current().unwrap();

    running.updates.send(client_config(&[second.addr])).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while Arc::ptr_eq(&running.client.manager().current().unwrap(), &old_balancer) {
        assert!(tokio::time::Instant::now() < deadline, "reload never applied");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (mut new_tunnel, status) = open_tunnel(running.local, echo).await;
    assert!(status.contains(" 200 "));
    assert_echo(&mut new_tunnel, b"via second").await;
    assert_eq!(second.connects.load(Ordering::SeqCst), 1);

    // The superseded balancer gets closed, the tunnel it opened keeps working.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(old_balancer.is_closed());
    assert_echo(&mut old_tunnel, b"still alive").await;

    running.shutdown.trigger();
}

#[tokio::test]
async fn empty_reload_is_ignored() {
    let first = common::start_chained_server(200).await;
    let running = start_client(client_config(&[first.addr])).await;
    let before = running.client.manager().current().unwrap();

    assert_eq!(running.client.apply_config(client_config(&[])), ReconfigureOutcome::Skipped);
    assert!(Arc::ptr_eq(&before, &running.client.manager().current().unwrap()));

    running.shutdown.trigger();
}

#[tokio::test]
async fn missing_balancer_is_fatal_for_the_client() {
    let echo = common::start_echo_server().await;
    let mut config = client_config(&[]);
    config.balancer.acquire_timeout_secs = 1;
    let running = start_client(config).await;

    let (_stream, status) = open_tunnel(running.local, echo).await;
    assert!(status.contains(" 503 "), "unexpected status: {status}");

    tokio::time::timeout(Duration::from_secs(5), running.task)
        .await
        .expect("client kept running without a balancer")
        .unwrap();
    assert!(running.shutdown.is_triggered());
}
