//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{copy_bidirectional, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Start a TCP server that echoes everything it receives.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = socket.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });

    addr
}

/// A mock chained server that answers CONNECT with `status` and, on 200,
/// splices the connection to the requested target.
pub struct MockChainedServer {
    pub addr: SocketAddr,
    pub connects: Arc<AtomicUsize>,
    pub last_head: Arc<tokio::sync::Mutex<String>>,
}

pub async fn start_chained_server(status: u16) -> MockChainedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connects = Arc::new(AtomicUsize::new(0));
    let last_head = Arc::new(tokio::sync::Mutex::new(String::new()));

    let counter = connects.clone();
    let head_slot = last_head.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            let head_slot = head_slot.clone();
            tokio::spawn(async move {
                let Some(head) = read_head(&mut socket).await else { return };
                counter.fetch_add(1, Ordering::SeqCst);
                *head_slot.lock().await = head.clone();

                if status != 200 {
                    let reply = format!("HTTP/1.1 {status} Nope\r\nContent-Length: 0\r\n\r\n");
                    let _ = socket.write_all(reply.as_bytes()).await;
                    return;
                }

                let target = head.split_whitespace().nth(1).unwrap_or_default().to_string();
                let Ok(mut upstream) = TcpStream::connect(&target).await else {
                    let _ = socket.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
                    return;
                };
                let _ = socket.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await;
                let _ = copy_bidirectional(&mut socket, &mut upstream).await;
            });
        }
    });

    MockChainedServer {
        addr,
        connects,
        last_head,
    }
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Read an HTTP head byte by byte. Returns None if the peer closes first.
pub async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await.ok()? == 0 {
            return None;
        }
        head.push(byte[0]);
    }
    String::from_utf8(head).ok()
}
