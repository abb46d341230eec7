//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received or fatal error → Stop accepting → Drain tunnels → Exit
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl+C) → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Shutdown has timeout: remaining tunnels are abandoned after the deadline
//! - A missing balancer is fatal and shuts the client down like a signal would

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
