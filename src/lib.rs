//! Chained-proxy tunneling client with a hot-swappable balancer.

pub mod balancer;
pub mod cell;
pub mod client;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use balancer::{Balancer, BalancerError, BalancerManager};
pub use cell::ValueCell;
pub use client::Client;
pub use config::ClientConfig;
pub use lifecycle::Shutdown;
