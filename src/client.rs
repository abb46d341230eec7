//! Client wiring.
//!
//! # Responsibilities
//! - Hold the current configuration snapshot
//! - Turn each new configuration into a balancer reconfiguration
//! - Accept local connections and hand them to the tunnel handler
//! - Shut down when signalled or when no balancer can ever be obtained

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;

use crate::balancer::{Balancer, BalancerManager, ReconfigureOutcome};
use crate::cell::ValueCell;
use crate::config::ClientConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::{serve_connection, Listener};

/// How long shutdown waits for open tunnels to finish.
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The local tunneling client.
pub struct Client {
    config: ArcSwap<ClientConfig>,
    manager: BalancerManager<Balancer>,
    tracker: ConnectionTracker,
}

impl Client {
    /// Create a client. No balancer exists until [`apply_config`](Self::apply_config) runs.
    pub fn new(config: ClientConfig) -> Self {
        let acquire_timeout = Duration::from_secs(config.balancer.acquire_timeout_secs);
        let manager = BalancerManager::new(ValueCell::new()).with_acquire_timeout(acquire_timeout);

        Self {
            config: ArcSwap::from_pointee(config),
            manager,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<ClientConfig> {
        self.config.load_full()
    }

    pub fn manager(&self) -> &BalancerManager<Balancer> {
        &self.manager
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Store `config` and rebuild the balancer from its chained servers.
    ///
    /// Listener and acquire-timeout changes only take effect on restart.
    pub fn apply_config(&self, config: ClientConfig) -> ReconfigureOutcome {
        let previous = self.config.load_full();
        if previous.listener.bind_address != config.listener.bind_address {
            tracing::warn!(
                current = %previous.listener.bind_address,
                requested = %config.listener.bind_address,
                "Listener address changes require a restart"
            );
        }

        let config = Arc::new(config);
        self.config.store(Arc::clone(&config));
        self.manager.reconfigure(&config.chained_servers, &config.device_id)
    }

    /// Serve local connections until `shutdown` fires.
    ///
    /// Configurations arriving on `config_updates` are applied one at a time.
    pub async fn run(
        self: Arc<Self>,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<ClientConfig>,
        shutdown: Shutdown,
    ) {
        let mut shutdown_rx = shutdown.subscribe();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Client accepting connections");
        }

        while !shutdown.is_triggered() {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        let client = Arc::clone(&self);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            let connection_id = guard.id();
                            let dial_timeout = Duration::from_secs(client.config().balancer.dial_timeout_secs);

                            match serve_connection(stream, &client.manager, dial_timeout).await {
                                Ok(stats) => tracing::debug!(
                                    connection_id = %connection_id,
                                    peer = %peer,
                                    sent = stats.client_to_target,
                                    received = stats.target_to_client,
                                    "Tunnel closed"
                                ),
                                Err(e) if e.is_fatal() => {
                                    tracing::error!(connection_id = %connection_id, error = %e, "No balancer available, shutting down");
                                    shutdown.trigger();
                                }
                                Err(e) => tracing::warn!(connection_id = %connection_id, peer = %peer, error = %e, "Tunnel failed"),
                            }
                            drop(guard);
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(config) = config_updates.recv() => {
                    let outcome = self.apply_config(config);
                    tracing::info!(?outcome, "Configuration reloaded");
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::info!(active = self.tracker.active_count(), "Client stopping, draining tunnels");
        if !self.tracker.wait_idle(SHUTDOWN_DRAIN_TIMEOUT).await {
            tracing::warn!(active = self.tracker.active_count(), "Drain timed out");
        }
    }
}
