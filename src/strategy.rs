//! Scheduling strategies.
//!
//! A strategy owns only its ordering structure. Availability lives in the
//! scheduler's [`NodeMirror`], which is passed in on every selection.

use crate::config::SchedulerType;
use crate::provider::Provider;
use crate::scheduler::NodeMirror;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// Trait for scheduling strategies.
pub trait Strategy: Send + Sync {
    /// A node was added to the mirror.
    fn node_added(&mut self, provider_id: &str);

    /// A node was removed from the mirror.
    fn node_removed(&mut self, provider_id: &str);

    /// Pick the next available provider, or `None` if no node is available.
    fn select(&mut self, nodes: &NodeMirror) -> Option<Arc<dyn Provider>>;

    /// Get the strategy name.
    fn name(&self) -> &'static str;
}

/// Uniformly random choice among available nodes.
#[derive(Debug, Default)]
pub struct RandomStrategy {
    /// Known identities, unordered.
    ids: Vec<String>,
}

impl RandomStrategy {
    /// Create a new random strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RandomStrategy {
    fn node_added(&mut self, provider_id: &str) {
        self.ids.push(provider_id.to_string());
    }

    fn node_removed(&mut self, provider_id: &str) {
        if let Some(pos) = self.ids.iter().position(|id| id == provider_id) {
            self.ids.swap_remove(pos);
        }
    }

    fn select(&mut self, nodes: &NodeMirror) -> Option<Arc<dyn Provider>> {
        let candidates: Vec<&str> = self
            .ids
            .iter()
            .map(String::as_str)
            .filter(|id| nodes.is_available(id))
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let idx = rand::RngExt::random_range(&mut rand::rng(), 0..candidates.len());
        nodes.provider(candidates[idx])
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// FIFO rotation over registration order.
///
/// Unavailable nodes keep their place in the rotation. Removed identities
/// are purged lazily the next time the queue reaches them.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    queue: VecDeque<String>,
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue length, including identities awaiting lazy removal.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl Strategy for RoundRobinStrategy {
    fn node_added(&mut self, provider_id: &str) {
        // A re-registered identity that was never purged keeps its old slot.
        if !self.queue.iter().any(|id| id == provider_id) {
            self.queue.push_back(provider_id.to_string());
        }
    }

    fn node_removed(&mut self, _provider_id: &str) {}

    fn select(&mut self, nodes: &NodeMirror) -> Option<Arc<dyn Provider>> {
        // One pass at most: every queued identity is looked at once.
        for _ in 0..self.queue.len() {
            let id = self.queue.pop_front()?;

            let Some(node) = nodes.get(&id) else {
                trace!(provider = %id, "Purging removed provider from rotation");
                continue;
            };

            let provider = node.is_available().then(|| Arc::clone(node.provider()));
            self.queue.push_back(id);

            if provider.is_some() {
                return provider;
            }
        }

        None
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Container for the configured strategy.
#[derive(Debug)]
pub enum StrategyContainer {
    /// Random selection.
    Random(RandomStrategy),
    /// Round-robin rotation.
    RoundRobin(RoundRobinStrategy),
}

impl StrategyContainer {
    /// Get the strategy as a trait object.
    pub fn as_strategy(&self) -> &dyn Strategy {
        match self {
            Self::Random(s) => s,
            Self::RoundRobin(s) => s,
        }
    }

    /// Get the strategy as a mutable trait object.
    pub fn as_strategy_mut(&mut self) -> &mut dyn Strategy {
        match self {
            Self::Random(s) => s,
            Self::RoundRobin(s) => s,
        }
    }

    /// Get strategy name.
    pub fn name(&self) -> &'static str {
        self.as_strategy().name()
    }
}

impl From<SchedulerType> for StrategyContainer {
    fn from(kind: SchedulerType) -> Self {
        match kind {
            SchedulerType::Random => Self::Random(RandomStrategy::new()),
            SchedulerType::RoundRobin => Self::RoundRobin(RoundRobinStrategy::new()),
        }
    }
}
