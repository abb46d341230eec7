//! Balancer over a fixed set of chained dialers.
//!
//! # Responsibilities
//! - Pick a dialer per connection (round robin, healthy first)
//! - Fall through to the next dialer when one fails
//! - Refuse new dials once closed and drain the ones in flight

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::balancer::dialer::ChainedDialer;
use crate::balancer::round_robin::RoundRobin;
use crate::balancer::{Balance, BalancerError};

/// Longest `close` waits for in-flight dials before giving up on them.
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Selects among a set of dialers for outbound connections.
#[derive(Debug)]
pub struct Balancer {
    dialers: Vec<Arc<ChainedDialer>>,
    selector: RoundRobin,
    closed: AtomicBool,
}

impl Balancer {
    /// Create a balancer over `dialers`.
    pub fn new(dialers: Vec<ChainedDialer>) -> Self {
        Self {
            dialers: dialers.into_iter().map(Arc::new).collect(),
            selector: RoundRobin::with_random_start(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn dialers(&self) -> &[Arc<ChainedDialer>] {
        &self.dialers
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of dialers not currently marked unhealthy.
    pub fn healthy_count(&self) -> usize {
        self.dialers.iter().filter(|d| d.is_healthy()).count()
    }

    /// Open a tunnel to `target`, trying each dialer at most once.
    pub async fn dial(&self, target: &str, timeout: Duration) -> Result<TcpStream, BalancerError> {
        if self.is_closed() {
            return Err(BalancerError::Closed);
        }

        let order = self.selector.attempt_order(&self.dialers);
        let mut last_error = None;

        for (attempt, dialer) in order.iter().enumerate() {
            match dialer.dial(target, timeout).await {
                Ok(stream) => {
                    tracing::debug!(
                        chained = %dialer.addr(),
                        dest = %target,
                        attempt = attempt + 1,
                        "Dialed through chained server"
                    );
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::warn!(
                        chained = %dialer.addr(),
                        dest = %target,
                        error = %e,
                        "Chained server dial failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(BalancerError::Dial {
                attempts: order.len(),
                last,
            }),
            None => Err(BalancerError::NoDialers),
        }
    }

    async fn drain(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            let in_flight: usize = self.dialers.iter().map(|d| d.in_flight()).sum();
            if in_flight == 0 {
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(in_flight, "Balancer drain timed out, abandoning in-flight dials");
                return;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

impl Balance for Balancer {
    type Dialer = ChainedDialer;

    fn from_dialers(dialers: Vec<ChainedDialer>) -> Self {
        Self::new(dialers)
    }

    fn close(&self) -> impl Future<Output = ()> + Send {
        async move {
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            self.drain(CLOSE_DRAIN_TIMEOUT).await;
            tracing::debug!(dialers = self.dialers.len(), "Balancer closed");
        }
    }
}
