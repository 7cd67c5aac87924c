//! Availability tracking and the re-inclusion policy.
//!
//! The tracker owns one trace record per registered provider holding its
//! `alive` and `excluded` flags. A provider is available when it is alive
//! and not excluded. Every change of that derived flag is published on the
//! availability subject as an [`AvailabilityChanged`] carrying a
//! tracker-wide sequence number, after the tracker lock has been released.
//!
//! With the re-inclusion policy enabled, an excluded provider gets a counter
//! that every heartbeat report decrements. When it reaches zero the
//! exclusion is cleared automatically.

use crate::config::{HeartbeatConfig, ReInclusionConfig};
use crate::error::{LoadBalancerError, LoadBalancerResult};
use crate::event::{
    AvailabilityChanged, AvailabilitySubject, Observer, RegistryEvent, RegistryObserver,
};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatSink};
use crate::provider::Provider;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-provider liveness and exclusion flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TraceRecord {
    /// Registration the record belongs to.
    generation: u64,
    alive: bool,
    excluded: bool,
}

impl TraceRecord {
    fn available(self) -> bool {
        self.alive && !self.excluded
    }
}

#[derive(Default)]
struct TrackerState {
    traces: HashMap<String, TraceRecord>,
    /// Remaining heartbeats before automatic re-inclusion.
    reinclusion: HashMap<String, u32>,
    monitors: HashMap<String, HeartbeatMonitor>,
    sequence: u64,
}

impl TrackerState {
    fn trace_mut(&mut self, provider_id: &str) -> LoadBalancerResult<&mut TraceRecord> {
        self.traces
            .get_mut(provider_id)
            .ok_or_else(|| LoadBalancerError::UnknownTraceable(provider_id.to_string()))
    }

    fn trace(&self, provider_id: &str) -> LoadBalancerResult<TraceRecord> {
        self.traces
            .get(provider_id)
            .copied()
            .ok_or_else(|| LoadBalancerError::UnknownTraceable(provider_id.to_string()))
    }

    /// Build the transition event if availability changed.
    fn transition(
        &mut self,
        provider_id: &str,
        before: TraceRecord,
        after: TraceRecord,
    ) -> Option<AvailabilityChanged> {
        if before.available() == after.available() {
            return None;
        }
        self.sequence += 1;
        Some(AvailabilityChanged {
            provider_id: provider_id.to_string(),
            generation: after.generation,
            available: after.available(),
            sequence: self.sequence,
        })
    }
}

/// Tracks per-provider availability and drives heartbeat monitors.
///
/// Attach it to the registry subject: it starts a [`HeartbeatMonitor`] on
/// `Registered` and stops it on `Unregistered`. Monitors are owned by the
/// tracker, so dropping the tracker stops every heartbeat.
pub struct AvailabilityTracker {
    /// Observer identity.
    id: String,
    /// Traces, counters and monitors under one lock.
    state: Mutex<TrackerState>,
    /// Channel for availability transitions.
    subject: Arc<AvailabilitySubject>,
    heartbeat: HeartbeatConfig,
    reinclusion: ReInclusionConfig,
    /// Runtime the heartbeat tasks are spawned on.
    runtime: Handle,
    /// Handed to monitors so they do not keep the tracker alive.
    self_ref: Weak<AvailabilityTracker>,
}

impl fmt::Debug for AvailabilityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvailabilityTracker")
            .field("id", &self.id)
            .field("tracked", &self.tracked_count())
            .field("heartbeat", &self.heartbeat)
            .field("reinclusion", &self.reinclusion)
            .finish()
    }
}

impl AvailabilityTracker {
    /// Create a tracker that spawns heartbeats on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`LoadBalancerError::RuntimeUnavailable`] outside a tokio runtime
    /// - [`LoadBalancerError::InvalidArgument`] for a zero heartbeat interval
    ///   or an enabled policy requiring zero heartbeats
    pub fn new(
        subject: Arc<AvailabilitySubject>,
        heartbeat: HeartbeatConfig,
        reinclusion: ReInclusionConfig,
    ) -> LoadBalancerResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| LoadBalancerError::RuntimeUnavailable)?;
        Self::with_runtime(subject, heartbeat, reinclusion, runtime)
    }

    /// Create a tracker that spawns heartbeats on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::InvalidArgument`] for a zero heartbeat
    /// interval or an enabled policy requiring zero heartbeats.
    pub fn with_runtime(
        subject: Arc<AvailabilitySubject>,
        heartbeat: HeartbeatConfig,
        reinclusion: ReInclusionConfig,
        runtime: Handle,
    ) -> LoadBalancerResult<Arc<Self>> {
        if heartbeat.interval.is_zero() {
            return Err(LoadBalancerError::InvalidArgument(
                "heartbeat interval must be positive".to_string(),
            ));
        }
        if reinclusion.enabled && reinclusion.required_heartbeats == 0 {
            return Err(LoadBalancerError::InvalidArgument(
                "re-inclusion requires at least one heartbeat".to_string(),
            ));
        }

        Ok(Arc::new_cyclic(|self_ref| Self {
            id: format!("availability-tracker-{}", Uuid::new_v4()),
            state: Mutex::new(TrackerState::default()),
            subject,
            heartbeat,
            reinclusion,
            runtime,
            self_ref: self_ref.clone(),
        }))
    }

    /// Record a heartbeat result.
    ///
    /// While the provider is excluded and the policy is enabled, every report
    /// counts towards re-inclusion regardless of its result.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::UnknownTraceable`] if the provider is not
    /// tracked.
    pub fn update_aliveness(&self, provider_id: &str, alive: bool) -> LoadBalancerResult<()> {
        self.record_aliveness(provider_id, None, alive)
    }

    /// Shared by manual updates and heartbeat reports. A report for another
    /// registration of the identity is treated as untracked.
    fn record_aliveness(
        &self,
        provider_id: &str,
        generation: Option<u64>,
        alive: bool,
    ) -> LoadBalancerResult<()> {
        let event = {
            let mut state = self.lock();
            let before = state.trace(provider_id)?;
            if generation.is_some_and(|g| g != before.generation) {
                return Err(LoadBalancerError::UnknownTraceable(provider_id.to_string()));
            }

            let mut reincluded = false;
            if self.reinclusion.enabled && before.excluded {
                let remaining = state
                    .reinclusion
                    .entry(provider_id.to_string())
                    .or_insert(self.reinclusion.required_heartbeats);
                *remaining = remaining.saturating_sub(1);
                debug!(provider = provider_id, remaining = *remaining, "Re-inclusion countdown");

                if *remaining == 0 {
                    state.reinclusion.remove(provider_id);
                    reincluded = true;
                }
            }

            let trace = state.trace_mut(provider_id)?;
            trace.alive = alive;
            if reincluded {
                trace.excluded = false;
            }
            let after = *trace;

            if reincluded {
                info!(provider = provider_id, "Provider re-included automatically");
            }
            if before.alive != after.alive {
                debug!(provider = provider_id, alive, "Aliveness changed");
            }

            state.transition(provider_id, before, after)
        };

        self.publish(event);
        Ok(())
    }

    /// Set or clear manual exclusion.
    ///
    /// Excluding with the policy enabled starts the re-inclusion countdown
    /// unless one is already running. Including cancels it.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::UnknownTraceable`] if the provider is not
    /// tracked.
    pub fn update_exclusion(&self, provider_id: &str, excluded: bool) -> LoadBalancerResult<()> {
        let event = {
            let mut state = self.lock();
            let trace = state.trace_mut(provider_id)?;
            let before = *trace;
            trace.excluded = excluded;
            let after = *trace;

            if excluded {
                if self.reinclusion.enabled {
                    state
                        .reinclusion
                        .entry(provider_id.to_string())
                        .or_insert(self.reinclusion.required_heartbeats);
                }
            } else {
                state.reinclusion.remove(provider_id);
            }

            if before.excluded != excluded {
                info!(provider = provider_id, excluded, "Exclusion changed");
            }

            state.transition(provider_id, before, after)
        };

        self.publish(event);
        Ok(())
    }

    /// Last reported liveness.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::UnknownTraceable`] if the provider is not
    /// tracked.
    pub fn is_alive(&self, provider_id: &str) -> LoadBalancerResult<bool> {
        Ok(self.lock().trace(provider_id)?.alive)
    }

    /// Whether the provider is excluded.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::UnknownTraceable`] if the provider is not
    /// tracked.
    pub fn is_excluded(&self, provider_id: &str) -> LoadBalancerResult<bool> {
        Ok(self.lock().trace(provider_id)?.excluded)
    }

    /// Whether the provider is alive and not excluded.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::UnknownTraceable`] if the provider is not
    /// tracked.
    pub fn is_available(&self, provider_id: &str) -> LoadBalancerResult<bool> {
        Ok(self.lock().trace(provider_id)?.available())
    }

    /// Number of tracked providers.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.lock().traces.len()
    }

    /// Heartbeats still required before automatic re-inclusion, if a
    /// countdown is running.
    #[must_use]
    pub fn reinclusion_remaining(&self, provider_id: &str) -> Option<u32> {
        self.lock().reinclusion.get(provider_id).copied()
    }

    /// Re-inclusion policy in effect.
    #[must_use]
    pub fn reinclusion_policy(&self) -> ReInclusionConfig {
        self.reinclusion
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().expect("tracker lock poisoned")
    }

    fn publish(&self, event: Option<AvailabilityChanged>) {
        if let Some(event) = event {
            debug!(
                provider = %event.provider_id,
                available = event.available,
                sequence = event.sequence,
                "Availability changed"
            );
            self.subject.notify(&event);
        }
    }

    fn track(&self, provider: &Arc<dyn Provider>, generation: u64) -> LoadBalancerResult<()> {
        let mut state = self.lock();
        if state.traces.contains_key(provider.id()) {
            return Err(LoadBalancerError::InternalInconsistency(format!(
                "provider '{}' is already tracked",
                provider.id()
            )));
        }

        let sink: Weak<dyn HeartbeatSink> = self.self_ref.clone();
        let monitor = HeartbeatMonitor::start(
            Arc::clone(provider),
            generation,
            sink,
            &self.heartbeat,
            &self.runtime,
        )?;

        state.traces.insert(
            provider.id().to_string(),
            TraceRecord {
                generation,
                alive: false,
                excluded: false,
            },
        );
        state.monitors.insert(provider.id().to_string(), monitor);
        debug!(provider = provider.id(), generation, "Tracking provider");
        Ok(())
    }

    fn untrack(&self, provider_id: &str) -> LoadBalancerResult<()> {
        let monitor = {
            let mut state = self.lock();
            if state.traces.remove(provider_id).is_none() {
                return Err(LoadBalancerError::InternalInconsistency(format!(
                    "provider '{provider_id}' is not tracked"
                )));
            }
            state.reinclusion.remove(provider_id);
            state.monitors.remove(provider_id)
        };

        if let Some(monitor) = monitor {
            monitor.stop();
        }
        debug!(provider = provider_id, "Stopped tracking provider");
        Ok(())
    }
}

impl Observer for AvailabilityTracker {
    fn observer_id(&self) -> &str {
        &self.id
    }
}

impl RegistryObserver for AvailabilityTracker {
    fn on_registry_event(&self, event: &RegistryEvent) -> LoadBalancerResult<()> {
        match event {
            RegistryEvent::Registered {
                provider,
                generation,
            } => self.track(provider, *generation),
            RegistryEvent::Unregistered { provider, .. } => self.untrack(provider.id()),
        }
    }
}

impl HeartbeatSink for AvailabilityTracker {
    fn report(&self, provider_id: &str, generation: u64, alive: bool) -> LoadBalancerResult<()> {
        self.record_aliveness(provider_id, Some(generation), alive)
            .inspect_err(|e| {
                debug!(provider = provider_id, error = %e, "Rejected heartbeat report");
            })
    }
}
