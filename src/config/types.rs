//! Configuration type definitions.

use super::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration for a load balancer instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Maximum number of registered providers.
    pub capacity: usize,

    /// Scheduling strategy.
    pub scheduler: SchedulerType,

    /// Automatic re-inclusion of excluded providers.
    pub reinclusion: ReInclusionConfig,

    /// Heartbeat timing shared by every provider.
    pub heartbeat: HeartbeatConfig,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            scheduler: SchedulerType::default(),
            reinclusion: ReInclusionConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl LoadBalancerConfig {
    /// Create a configuration with the given capacity and defaults elsewhere.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Set the scheduling strategy.
    #[must_use]
    pub fn scheduler(mut self, scheduler: SchedulerType) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Enable or disable the re-inclusion policy.
    #[must_use]
    pub fn reinclusion(mut self, enabled: bool) -> Self {
        self.reinclusion.enabled = enabled;
        self
    }

    /// Set the heartbeat timing.
    #[must_use]
    pub fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// Scheduling strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerType {
    /// Uniform random choice among available providers.
    Random,
    /// FIFO rotation in registration order.
    #[default]
    RoundRobin,
}

impl SchedulerType {
    /// Kebab-case name of the strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round-robin",
        }
    }
}

impl fmt::Display for SchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "round-robin" | "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            other => Err(ConfigError::InvalidValue {
                field: "scheduler".to_string(),
                message: format!("unknown scheduler type '{other}'"),
            }),
        }
    }
}

/// Re-inclusion policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReInclusionConfig {
    /// Whether excluded providers are re-included automatically.
    pub enabled: bool,

    /// Heartbeat reports required while excluded before re-inclusion.
    pub required_heartbeats: u32,
}

impl Default for ReInclusionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required_heartbeats: 2,
        }
    }
}

/// Heartbeat timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Delay before the first health probe.
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Interval between health probes.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(2),
        }
    }
}

impl HeartbeatConfig {
    /// Create a heartbeat configuration.
    #[must_use]
    pub fn new(initial_delay: Duration, interval: Duration) -> Self {
        Self {
            initial_delay,
            interval,
        }
    }
}
