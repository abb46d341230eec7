//! Local CONNECT handling.
//!
//! # Responsibilities
//! - Read the local client's `CONNECT host:port` request
//! - Obtain the current balancer and dial the target through it
//! - Answer the client and splice the two streams together

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, copy_bidirectional};
use tokio::net::TcpStream;

use crate::balancer::dialer::read_head;
use crate::balancer::{Balancer, BalancerError, BalancerManager};
use crate::observability::metrics;

const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const NOT_ALLOWED: &[u8] =
    b"HTTP/1.1 405 Method Not Allowed\r\nAllow: CONNECT\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const UNAVAILABLE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Errors while serving one local connection.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("unsupported method {0}, only CONNECT is accepted")]
    UnsupportedMethod(String),

    #[error(transparent)]
    Balancer(#[from] BalancerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TunnelError {
    /// True when the client can no longer operate at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TunnelError::Balancer(e) if e.is_fatal())
    }
}

/// Bytes copied in each direction once a tunnel closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_target: u64,
    pub target_to_client: u64,
}

/// Serve a single local connection to completion.
pub async fn serve_connection(
    mut local: TcpStream,
    manager: &BalancerManager<Balancer>,
    dial_timeout: Duration,
) -> Result<TunnelStats, TunnelError> {
    let head = read_head(&mut local).await?;
    let target = match parse_connect(&head) {
        Ok(target) => target,
        Err(e) => {
            let reply = match e {
                TunnelError::UnsupportedMethod(_) => NOT_ALLOWED,
                _ => BAD_REQUEST,
            };
            let _ = local.write_all(reply).await;
            metrics::record_tunnel("rejected");
            return Err(e);
        }
    };

    let balancer = match manager.acquire().await {
        Ok(b) => b,
        Err(e) => {
            let _ = local.write_all(UNAVAILABLE).await;
            metrics::record_tunnel("unavailable");
            return Err(e.into());
        }
    };

    let mut upstream = match balancer.dial(&target, dial_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = local.write_all(BAD_GATEWAY).await;
            metrics::record_tunnel("dial_failed");
            return Err(e.into());
        }
    };
    // The tunnel keeps working on its own stream even if this balancer is retired.
    drop(balancer);

    local.write_all(ESTABLISHED).await?;
    metrics::record_tunnel("established");
    tracing::debug!(dest = %target, "Tunnel open");

    let (client_to_target, target_to_client) = copy_bidirectional(&mut local, &mut upstream).await?;
    Ok(TunnelStats {
        client_to_target,
        target_to_client,
    })
}

/// Extract the `host:port` target from a CONNECT request head.
fn parse_connect(head: &str) -> Result<String, TunnelError> {
    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();

    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TunnelError::BadRequest(request_line.to_string()));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(TunnelError::BadRequest(request_line.to_string()));
    }
    if !method.eq_ignore_ascii_case("CONNECT") {
        return Err(TunnelError::UnsupportedMethod(method.to_string()));
    }
    match target.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(target.to_string()),
        _ => Err(TunnelError::BadRequest(format!("target '{target}' is not host:port"))),
    }
}
