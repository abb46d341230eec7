//! Weighted round-robin dialer selection.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::balancer::dialer::ChainedDialer;

/// Round-robin selector.
/// Stores an internal counter to rotate through dialers; a dialer with
/// weight `w` leads the rotation `w` times per cycle.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    /// Start the rotation at a random offset so that many clients sharing a
    /// server list do not all pick the same first server.
    pub fn with_random_start() -> Self {
        Self {
            counter: AtomicUsize::new(rand::thread_rng().gen_range(0..1024)),
        }
    }

    /// Full attempt order for one dial: healthy dialers in rotation order,
    /// followed by unhealthy ones as a last resort.
    pub fn attempt_order(&self, dialers: &[Arc<ChainedDialer>]) -> Vec<Arc<ChainedDialer>> {
        if dialers.is_empty() {
            return Vec::new();
        }

        let total: usize = dialers.iter().map(|d| d.weight() as usize).sum();
        let slot = self.counter.fetch_add(1, Ordering::Relaxed) % total.max(1);
        let lead = dialers
            .iter()
            .scan(0usize, |upto, d| {
                *upto += d.weight() as usize;
                Some(*upto)
            })
            .position(|upto| slot < upto)
            .unwrap_or(0);

        let len = dialers.len();
        let rotated = (0..len).map(|i| &dialers[(lead + i) % len]);

        let (mut healthy, unhealthy): (Vec<_>, Vec<_>) =
            rotated.cloned().partition(|d| d.is_healthy());
        healthy.extend(unhealthy);
        healthy
    }
}
