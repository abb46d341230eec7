//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → sent to the client, which stores the snapshot
//!       and reconfigures the balancer
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - A reload that fails to load or validate is dropped; the running
//!   configuration stays in place

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::BalancerConfig;
pub use schema::ChainedServerConfig;
pub use schema::ClientConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use watcher::ConfigWatcher;
