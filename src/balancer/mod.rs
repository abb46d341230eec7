//! Balancer subsystem.
//!
//! # Data Flow
//! ```text
//! Config reload → manager.rs reconfigure()
//!     → ChainedServerConfig::dialer(device_id)   (one per server, failures skipped)
//!     → Balancer::from_dialers(dialers)
//!     → ValueCell::replace(new)                  (publish)
//!     → spawned task: old.close()                (retire, never awaited)
//!
//! Dial path → manager.rs acquire()
//!     → ValueCell::get(acquire_timeout)
//!     → pool.rs Balancer::dial(target)
//!         → round_robin.rs (next healthy dialer)
//!         → dialer.rs ChainedDialer::dial (CONNECT tunnel)
//! ```
//!
//! # Design Decisions
//! - The cell is the only shared mutable point; the balancer itself is immutable
//! - Disposal of a superseded balancer is decoupled from publication
//! - The manager only knows the `Balance` and `DialerFactory` contracts

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub mod dialer;
pub mod manager;
pub mod pool;
pub mod round_robin;

pub use dialer::{ChainedDialer, DialerError, HealthState};
pub use manager::{BalancerManager, ReconfigureOutcome};
pub use pool::Balancer;
pub use round_robin::RoundRobin;

/// Builds one dialer from one server descriptor.
pub trait DialerFactory {
    type Dialer;

    /// Construct a dialer identifying itself as `device_id`.
    fn dialer(&self, device_id: &str) -> Result<Self::Dialer, DialerError>;
}

/// Lifecycle contract for a balancer held by [`BalancerManager`].
pub trait Balance: Send + Sync + 'static {
    type Dialer;

    /// Build a balancer over `dialers`. Never fails; an empty set is allowed.
    fn from_dialers(dialers: Vec<Self::Dialer>) -> Self;

    /// Release the balancer's resources. May wait on network teardown.
    ///
    /// Called at most once per retired instance by the manager.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Errors surfaced on the dial path.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// No balancer was published within the acquire deadline.
    ///
    /// The client cannot operate without a balancer; treat this as fatal.
    #[error("no balancer available after waiting {waited:?}")]
    Unavailable { waited: Duration },

    /// The balancer was built from an empty dialer set.
    #[error("balancer has no dialers")]
    NoDialers,

    /// The balancer has been closed.
    #[error("balancer is closed")]
    Closed,

    /// Every attempted dialer failed.
    #[error("all {attempts} dial attempts failed, last error: {last}")]
    Dial { attempts: usize, last: DialerError },
}

impl BalancerError {
    /// True for the unrecoverable "no balancer ever arrived" condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BalancerError::Unavailable { .. })
    }
}
