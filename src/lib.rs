//! # Provider Balancer
//!
//! Dispatch core of an in-process load balancer: a capacity-bounded
//! provider registry, heartbeat-driven availability tracking with an
//! optional re-inclusion policy, and pluggable scheduling.
//!
//! ## Features
//!
//! - Bounded registration with all-or-nothing batches
//! - Periodic health probes per provider on the tokio runtime
//! - Manual exclusion with automatic, heartbeat-debounced re-inclusion
//! - Random and round-robin scheduling over a local availability mirror
//!
//! ## Architecture
//!
//! Components talk through two event subjects. The
//! [`registry::ProviderRegistry`] publishes membership changes to the
//! [`availability::AvailabilityTracker`] and the [`scheduler::Scheduler`].
//! The tracker publishes availability transitions to the scheduler. No
//! component holds its state lock while calling into another one.
//! [`LoadBalancer`] wires everything together.
//!
//! ```no_run
//! use provider_balancer::{LoadBalancer, LoadBalancerConfig, StaticProvider};
//! use std::sync::Arc;
//!
//! # async fn run() -> provider_balancer::LoadBalancerResult<()> {
//! let lb = LoadBalancer::new(LoadBalancerConfig::default())?;
//! lb.register(Arc::new(StaticProvider::new()))?;
//!
//! // `None` until the first heartbeat reports the provider alive.
//! let response = lb.get();
//! # Ok(())
//! # }
//! ```

pub mod availability;
pub mod balancer;
pub mod config;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod strategy;

pub use balancer::{LoadBalancer, LoadBalancerStats};
pub use config::{LoadBalancerConfig, SchedulerType};
pub use error::{LoadBalancerError, LoadBalancerResult};
pub use provider::{Provider, StaticProvider};
