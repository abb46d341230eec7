//! Chained-server dialer.
//!
//! # Responsibilities
//! - Represent one configured chained proxy
//! - Open tunneled connections through it (HTTP CONNECT)
//! - Track passive health state (Unknown/Healthy/Unhealthy)

use std::io;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::balancer::DialerFactory;
use crate::config::ChainedServerConfig;

/// Consecutive failures before a dialer is considered unhealthy.
pub const UNHEALTHY_THRESHOLD: usize = 3;
/// Consecutive successes before an unhealthy dialer is trusted again.
pub const HEALTHY_THRESHOLD: usize = 2;

/// Upper bound on an HTTP response/request head.
pub(crate) const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Errors building or using a dialer.
#[derive(Debug, Error)]
pub enum DialerError {
    #[error("invalid chained server address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: &'static str },

    #[error("device id is required to build a dialer")]
    MissingDeviceId,

    #[error("connect to chained server failed: {0}")]
    Connect(#[source] io::Error),

    #[error("dial timed out after {0:?}")]
    Timeout(Duration),

    #[error("chained server rejected CONNECT with status {status}")]
    Rejected { status: u16 },

    #[error("malformed handshake response: {0}")]
    Handshake(String),

    #[error("I/O error during handshake: {0}")]
    Io(#[from] io::Error),
}

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// A connector that tunnels through one chained proxy.
#[derive(Debug)]
pub struct ChainedDialer {
    /// Chained server address (`host:port`).
    addr: String,
    /// Token presented to the chained server.
    auth_token: String,
    /// Identifier of this client device.
    device_id: String,
    /// Relative share of first picks (at least 1).
    weight: u32,

    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    /// Dials currently in progress.
    in_flight: AtomicUsize,
}

impl ChainedDialer {
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Number of dials currently in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Return true if backend is considered healthy (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    /// Open a tunnel to `target` (`host:port`) through this chained server.
    pub async fn dial(&self, target: &str, timeout: Duration) -> Result<TcpStream, DialerError> {
        let result = {
            let _in_flight = InFlight::enter(&self.in_flight);
            match tokio::time::timeout(timeout, self.connect(target)).await {
                Ok(res) => res,
                Err(_) => Err(DialerError::Timeout(timeout)),
            }
        };

        match &result {
            Ok(_) => self.mark_success(HEALTHY_THRESHOLD),
            Err(e) => {
                tracing::debug!(chained = %self.addr, dest = %target, error = %e, "Dial failed");
                self.mark_failure(UNHEALTHY_THRESHOLD);
            }
        }
        result
    }

    async fn connect(&self, target: &str) -> Result<TcpStream, DialerError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(DialerError::Connect)?;

        stream.write_all(self.connect_request(target).as_bytes()).await?;

        let head = read_head(&mut stream).await?;
        let status = parse_status(&head)?;
        if !(200..300).contains(&status) {
            return Err(DialerError::Rejected { status });
        }

        tracing::trace!(chained = %self.addr, dest = %target, "Tunnel established");
        Ok(stream)
    }

    fn connect_request(&self, target: &str) -> String {
        format!(
            "CONNECT {target} HTTP/1.1\r\n\
             Host: {target}\r\n\
             X-Lantern-Auth-Token: {}\r\n\
             X-Lantern-Device-Id: {}\r\n\
             \r\n",
            self.auth_token, self.device_id
        )
    }

    /// Report a successful dial.
    pub fn mark_success(&self, healthy_threshold: usize) {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.state() == HealthState::Healthy {
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        // Unknown dialers become healthy on their first success.
        if self.state() == HealthState::Unknown || successes >= healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
        }
    }

    /// Report a failed dial.
    pub fn mark_failure(&self, unhealthy_threshold: usize) {
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if self.state() == HealthState::Unhealthy {
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            tracing::warn!(chained = %self.addr, failures, "Chained server marked unhealthy");
        }
    }
}

/// Counts one dial for as long as it lives, including when the dial future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl DialerFactory for ChainedServerConfig {
    type Dialer = ChainedDialer;

    fn dialer(&self, device_id: &str) -> Result<ChainedDialer, DialerError> {
        if device_id.trim().is_empty() {
            return Err(DialerError::MissingDeviceId);
        }
        validate_host_port(&self.addr)?;

        Ok(ChainedDialer {
            addr: self.addr.clone(),
            auth_token: self.auth_token.clone(),
            device_id: device_id.to_string(),
            weight: self.weight.max(1),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
        })
    }
}

fn validate_host_port(addr: &str) -> Result<(), DialerError> {
    let invalid = |reason| DialerError::InvalidAddress {
        addr: addr.to_string(),
        reason,
    };

    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid("port must be in 1..=65535")),
        Ok(_) => Ok(()),
    }
}

/// Read an HTTP message head (through the blank line) without consuming body bytes.
pub(crate) async fn read_head<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<String> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_HEAD_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "message head too large"));
        }
        if reader.read(&mut byte).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before end of head",
            ));
        }
        head.push(byte[0]);
    }

    String::from_utf8(head).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn parse_status(head: &str) -> Result<u16, DialerError> {
    let status_line = head.lines().next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse()
            .map_err(|_| DialerError::Handshake(status_line.to_string())),
        _ => Err(DialerError::Handshake(status_line.to_string())),
    }
}
