//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Local application connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking)
//!     → tunnel.rs (CONNECT request → balancer → chained server)
//!     → bytes spliced until either side closes
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - A tunnel holds its own upstream stream, not the balancer, so a balancer
//!   swap never cuts open tunnels

pub mod connection;
pub mod listener;
pub mod tunnel;

pub use listener::{Listener, ListenerError};
pub use tunnel::{serve_connection, TunnelError, TunnelStats};
