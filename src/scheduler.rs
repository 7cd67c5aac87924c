//! Scheduler: availability mirror plus a selection strategy.

use crate::config::SchedulerType;
use crate::error::{LoadBalancerError, LoadBalancerResult};
use crate::event::{
    AvailabilityChanged, AvailabilityObserver, Observer, RegistryEvent, RegistryObserver,
};
use crate::provider::Provider;
use crate::strategy::StrategyContainer;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};
use uuid::Uuid;

/// Scheduler-local view of one provider.
#[derive(Debug, Clone)]
pub struct SchedulingNode {
    provider: Arc<dyn Provider>,
    available: bool,
    /// Registration the node mirrors.
    generation: u64,
    /// Sequence of the last applied availability event.
    sequence: u64,
}

impl SchedulingNode {
    /// The mirrored provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Cached availability.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Registration generation the node was added under.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Mirror of provider availability, fed only by events.
#[derive(Debug, Default)]
pub struct NodeMirror {
    nodes: HashMap<String, SchedulingNode>,
}

impl NodeMirror {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unavailable node for registration `generation`.
    ///
    /// Returns `false` if the identity is present.
    pub fn add(&mut self, provider: Arc<dyn Provider>, generation: u64) -> bool {
        if self.nodes.contains_key(provider.id()) {
            return false;
        }
        self.nodes.insert(
            provider.id().to_string(),
            SchedulingNode {
                provider,
                available: false,
                generation,
                sequence: 0,
            },
        );
        true
    }

    /// Remove a node. Returns `false` if the identity is absent.
    pub fn remove(&mut self, provider_id: &str) -> bool {
        self.nodes.remove(provider_id).is_some()
    }

    /// Apply an availability event.
    ///
    /// Returns `false` for unknown identities, for events from another
    /// registration of the same identity, and for events older than the last
    /// one applied to the node.
    pub fn apply(&mut self, event: &AvailabilityChanged) -> bool {
        let Some(node) = self.nodes.get_mut(&event.provider_id) else {
            return false;
        };
        if event.generation != node.generation || event.sequence <= node.sequence {
            return false;
        }
        node.available = event.available;
        node.sequence = event.sequence;
        true
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<&SchedulingNode> {
        self.nodes.get(provider_id)
    }

    /// Provider handle of a node.
    #[must_use]
    pub fn provider(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.nodes.get(provider_id).map(|n| Arc::clone(&n.provider))
    }

    /// Cached availability; `false` for unknown identities.
    #[must_use]
    pub fn is_available(&self, provider_id: &str) -> bool {
        self.nodes.get(provider_id).is_some_and(|n| n.available)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the mirror is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of available nodes.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.nodes.values().filter(|n| n.available).count()
    }
}

struct SchedulerState {
    nodes: NodeMirror,
    strategy: StrategyContainer,
}

/// Hands out the next provider according to its strategy.
///
/// Attach it to both the registry and the availability subject. Selection
/// only reads the local mirror.
pub struct Scheduler {
    id: String,
    name: &'static str,
    state: Mutex<SchedulerState>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.id)
            .field("strategy", &self.name)
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler for the given strategy type.
    #[must_use]
    pub fn new(kind: SchedulerType) -> Self {
        Self::with_strategy(StrategyContainer::from(kind))
    }

    /// Create a scheduler around an existing strategy.
    #[must_use]
    pub fn with_strategy(strategy: StrategyContainer) -> Self {
        let name = strategy.name();
        Self {
            id: format!("scheduler-{name}-{}", Uuid::new_v4()),
            name,
            state: Mutex::new(SchedulerState {
                nodes: NodeMirror::new(),
                strategy,
            }),
        }
    }

    /// Strategy name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Select the next available provider.
    #[must_use]
    pub fn next(&self) -> Option<Arc<dyn Provider>> {
        let mut state = self.lock();
        let SchedulerState { nodes, strategy } = &mut *state;
        let selected = strategy.as_strategy_mut().select(nodes);
        trace!(
            provider = selected.as_ref().map(|p| p.id()),
            "Scheduler selection"
        );
        selected
    }

    /// Number of mirrored nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Number of mirrored nodes currently available.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.lock().nodes.available_count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().expect("scheduler lock poisoned")
    }
}

impl Observer for Scheduler {
    fn observer_id(&self) -> &str {
        &self.id
    }
}

impl RegistryObserver for Scheduler {
    fn on_registry_event(&self, event: &RegistryEvent) -> LoadBalancerResult<()> {
        let mut state = self.lock();
        match event {
            RegistryEvent::Registered {
                provider,
                generation,
            } => {
                if !state.nodes.add(Arc::clone(provider), *generation) {
                    return Err(LoadBalancerError::InternalInconsistency(format!(
                        "scheduler already has a node for '{}'",
                        provider.id()
                    )));
                }
                state.strategy.as_strategy_mut().node_added(provider.id());
            },
            RegistryEvent::Unregistered { provider, .. } => {
                if !state.nodes.remove(provider.id()) {
                    return Err(LoadBalancerError::InternalInconsistency(format!(
                        "scheduler has no node for '{}'",
                        provider.id()
                    )));
                }
                state.strategy.as_strategy_mut().node_removed(provider.id());
            },
        }
        debug!(
            scheduler = self.name,
            provider = event.provider_id(),
            event = event.kind(),
            "Scheduler mirror updated"
        );
        Ok(())
    }
}

impl AvailabilityObserver for Scheduler {
    fn on_availability_changed(&self, event: &AvailabilityChanged) {
        if !self.lock().nodes.apply(event) {
            trace!(
                provider = %event.provider_id,
                generation = event.generation,
                sequence = event.sequence,
                "Ignored stale or unknown availability event"
            );
        }
    }
}
