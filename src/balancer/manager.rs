//! Publication and retirement of the current balancer.
//!
//! # State Machine
//! ```text
//! cell: empty ──reconfigure(servers)──▶ B1 ──reconfigure──▶ B2 ...
//!                                         └─ B1.close() on a detached task
//!
//! reconfigure with no servers: cell untouched
//! acquire(): wait for the cell (acquire_timeout), else Unavailable
//! ```
//!
//! # Design Decisions
//! - Reconfiguration is not serialized here; the config subsystem feeds it
//!   one config at a time. Overlapping calls still retire every superseded
//!   balancer exactly once because publication is an atomic replace.
//! - Disposal runs on a spawned task that nothing awaits. Its only ordering
//!   guarantee is that it starts after the replacement was published.

use std::sync::Arc;
use std::time::Duration;

use crate::balancer::{Balance, BalancerError, DialerFactory};
use crate::cell::ValueCell;
use crate::observability::metrics;

/// Default wait for a balancer to appear before giving up.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// What a call to [`BalancerManager::reconfigure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconfigureOutcome {
    /// No servers configured; the cell was left as it was.
    Skipped,
    /// A new balancer was published.
    Published {
        /// Dialers the new balancer was built from.
        dialers: usize,
        /// Entries whose dialer could not be built.
        rejected: usize,
        /// Whether a previous balancer was handed off for closing.
        retired_previous: bool,
    },
}

/// Owns the reconfiguration protocol around the shared balancer cell.
pub struct BalancerManager<B> {
    cell: ValueCell<Arc<B>>,
    acquire_timeout: Duration,
}

impl<B> Clone for BalancerManager<B> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            acquire_timeout: self.acquire_timeout,
        }
    }
}

impl<B: Balance> BalancerManager<B> {
    /// Create a manager over `cell`, which may already hold a balancer.
    pub fn new(cell: ValueCell<Arc<B>>) -> Self {
        Self {
            cell,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Override how long [`acquire`](Self::acquire) waits.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn cell(&self) -> &ValueCell<Arc<B>> {
        &self.cell
    }

    /// Current balancer, if one has been published. Never waits.
    pub fn current(&self) -> Option<Arc<B>> {
        self.cell.peek()
    }

    /// Wait for the current balancer.
    ///
    /// Returns [`BalancerError::Unavailable`] if none is published within the
    /// acquire timeout. Callers should treat that as fatal.
    pub async fn acquire(&self) -> Result<Arc<B>, BalancerError> {
        match self.cell.get(self.acquire_timeout).await {
            Some(balancer) => Ok(balancer),
            None => {
                tracing::error!(waited = ?self.acquire_timeout, "No balancer was ever published");
                Err(BalancerError::Unavailable {
                    waited: self.acquire_timeout,
                })
            }
        }
    }

    /// Build a balancer from `servers` and publish it, retiring the old one.
    ///
    /// Entries whose dialer cannot be built are logged and skipped. The new
    /// balancer is published even if every entry was skipped. With no servers
    /// at all nothing is built and the cell is left untouched.
    ///
    /// Must be called from within a Tokio runtime; the old balancer is closed
    /// on a spawned task.
    pub fn reconfigure<S>(&self, servers: &[S], device_id: &str) -> ReconfigureOutcome
    where
        S: DialerFactory<Dialer = B::Dialer>,
    {
        if servers.is_empty() {
            tracing::debug!("No chained servers configured, not initializing balancer");
            metrics::record_reconfiguration("skipped");
            return ReconfigureOutcome::Skipped;
        }

        tracing::debug!(count = servers.len(), "Adding chained servers");
        let mut dialers = Vec::with_capacity(servers.len());
        let mut rejected = 0;
        for (index, server) in servers.iter().enumerate() {
            match server.dialer(device_id) {
                Ok(dialer) => dialers.push(dialer),
                Err(e) => {
                    rejected += 1;
                    metrics::record_dialer_error();
                    tracing::error!(index, error = %e, "Unable to configure chained server");
                }
            }
        }

        let built = dialers.len();
        let balancer = Arc::new(B::from_dialers(dialers));

        tracing::trace!(dialers = built, "Publishing balancer");
        let previous = self.cell.replace(balancer);
        let retired_previous = previous.is_some();
        if let Some(old) = previous {
            retire(old);
        }

        metrics::record_reconfiguration("published");
        tracing::info!(dialers = built, rejected, retired_previous, "Balancer published");

        ReconfigureOutcome::Published {
            dialers: built,
            rejected,
            retired_previous,
        }
    }
}

/// Close a superseded balancer on its own task. The handle is dropped; a
/// panicking `close` is contained by the task and never reaches the caller.
fn retire<B: Balance>(old: Arc<B>) {
    tokio::spawn(async move {
        old.close().await;
        metrics::record_retired();
        tracing::debug!("Closed old balancer");
    });
}
