//! # Configuration System
//!
//! TOML-based configuration for a load balancer instance: pool capacity,
//! scheduling strategy, re-inclusion policy and heartbeat timing.
//!
//! ## Example Configuration
//!
//! ```toml
//! capacity = 10
//! scheduler = "round-robin"
//!
//! [reinclusion]
//! enabled = true
//! required_heartbeats = 2
//!
//! [heartbeat]
//! initial_delay = "2s"
//! interval = "2s"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{HeartbeatConfig, LoadBalancerConfig, ReInclusionConfig, SchedulerType};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
