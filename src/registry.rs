//! Capacity-bounded provider registry.
//!
//! Mutations for all identities are serialized with their publication, so
//! observers see `Registered` and `Unregistered` events in the same order the
//! membership changed. Observers must not mutate the registry from inside a
//! callback.

use crate::error::{LoadBalancerError, LoadBalancerResult};
use crate::event::{RegistryEvent, RegistrySubject};
use crate::provider::Provider;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// A registered provider and the generation it was admitted under.
struct Member {
    provider: Arc<dyn Provider>,
    generation: u64,
}

struct Members {
    by_id: HashMap<String, Member>,
    /// Last generation handed out.
    generation: u64,
}

impl Members {
    fn admit(&mut self, provider: &Arc<dyn Provider>) -> u64 {
        self.generation += 1;
        self.by_id.insert(
            provider.id().to_string(),
            Member {
                provider: Arc::clone(provider),
                generation: self.generation,
            },
        );
        self.generation
    }
}

/// Set of registered providers, bounded by a fixed capacity.
///
/// Every successful membership change is published on the registry subject
/// after the membership lock has been released, but before the next
/// mutation may start.
pub struct ProviderRegistry {
    /// Maximum number of providers.
    capacity: usize,
    /// Registered providers by identity.
    providers: RwLock<Members>,
    /// Held from mutation until every observer has seen the event.
    publish: Mutex<()>,
    /// Channel for membership events.
    subject: Arc<RegistrySubject>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("capacity", &self.capacity)
            .field("registered", &self.registered_count())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::InvalidArgument`] if `capacity` is zero.
    pub fn new(capacity: usize, subject: Arc<RegistrySubject>) -> LoadBalancerResult<Self> {
        if capacity == 0 {
            return Err(LoadBalancerError::InvalidArgument(
                "capacity must be positive".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            providers: RwLock::new(Members {
                by_id: HashMap::with_capacity(capacity),
                generation: 0,
            }),
            publish: Mutex::new(()),
            subject,
        })
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of registered providers.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.providers.read().expect("providers lock poisoned").by_id.len()
    }

    /// Remaining free slots.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.registered_count())
    }

    /// Register a single provider.
    ///
    /// # Errors
    ///
    /// - [`LoadBalancerError::InvalidArgument`] for an empty identity
    /// - [`LoadBalancerError::AlreadyRegistered`] if the identity is present
    /// - [`LoadBalancerError::CapacityExceeded`] if the pool is full
    /// - any error raised by a registry observer
    pub fn register(&self, provider: Arc<dyn Provider>) -> LoadBalancerResult<()> {
        validate_id(provider.id())?;

        let _publish = self.publish_guard();
        let generation = {
            let mut members = self.providers.write().expect("providers lock poisoned");

            if members.by_id.contains_key(provider.id()) {
                return Err(LoadBalancerError::AlreadyRegistered(provider.id().to_string()));
            }

            let free = self.capacity - members.by_id.len();
            if free == 0 {
                return Err(LoadBalancerError::CapacityExceeded {
                    capacity: self.capacity,
                    requested: 1,
                    free,
                });
            }

            members.admit(&provider)
        };

        info!(provider = provider.id(), generation, "Registered provider");
        self.subject
            .notify(&RegistryEvent::registered(provider, generation))
    }

    /// Register a batch of providers, all or nothing.
    ///
    /// The whole batch is checked before anything is admitted. On success a
    /// `Registered` event is published per member in input order.
    ///
    /// # Errors
    ///
    /// - [`LoadBalancerError::CapacityExceeded`] if the batch does not fit
    /// - [`LoadBalancerError::AlreadyRegistered`] if any member is present,
    ///   or appears twice in the batch
    /// - [`LoadBalancerError::InvalidArgument`] for an empty identity
    /// - the first error raised by a registry observer
    pub fn register_all<I>(&self, providers: I) -> LoadBalancerResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Provider>>,
    {
        let batch: Vec<Arc<dyn Provider>> = providers.into_iter().collect();
        if batch.is_empty() {
            return Ok(());
        }

        let _publish = self.publish_guard();
        let admitted: Vec<(Arc<dyn Provider>, u64)> = {
            let mut members = self.providers.write().expect("providers lock poisoned");

            let free = self.capacity - members.by_id.len();
            if batch.len() > free {
                return Err(LoadBalancerError::CapacityExceeded {
                    capacity: self.capacity,
                    requested: batch.len(),
                    free,
                });
            }

            {
                let mut seen = HashSet::with_capacity(batch.len());
                for provider in &batch {
                    validate_id(provider.id())?;
                    if members.by_id.contains_key(provider.id()) || !seen.insert(provider.id()) {
                        return Err(LoadBalancerError::AlreadyRegistered(
                            provider.id().to_string(),
                        ));
                    }
                }
            }

            batch
                .into_iter()
                .map(|provider| {
                    let generation = members.admit(&provider);
                    (provider, generation)
                })
                .collect()
        };

        info!(count = admitted.len(), "Registered provider batch");

        let mut first_err = None;
        for (provider, generation) in admitted {
            debug!(provider = provider.id(), generation, "Publishing batch registration");
            if let Err(e) = self
                .subject
                .notify(&RegistryEvent::registered(provider, generation))
            {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Unregister a provider by identity.
    ///
    /// # Errors
    ///
    /// - [`LoadBalancerError::NotRegistered`] if the identity is absent
    /// - any error raised by a registry observer
    pub fn unregister(&self, provider_id: &str) -> LoadBalancerResult<()> {
        let _publish = self.publish_guard();
        let removed = self
            .providers
            .write()
            .expect("providers lock poisoned")
            .by_id
            .remove(provider_id)
            .ok_or_else(|| LoadBalancerError::NotRegistered(provider_id.to_string()))?;

        info!(
            provider = provider_id,
            generation = removed.generation,
            "Unregistered provider"
        );
        self.subject.notify(&RegistryEvent::unregistered(
            removed.provider,
            removed.generation,
        ))
    }

    /// Check whether an identity is registered.
    #[must_use]
    pub fn is_registered(&self, provider_id: &str) -> bool {
        self.providers
            .read()
            .expect("providers lock poisoned")
            .by_id
            .contains_key(provider_id)
    }

    /// Unordered snapshot of the registered providers.
    #[must_use]
    pub fn list_providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers
            .read()
            .expect("providers lock poisoned")
            .by_id
            .values()
            .map(|member| Arc::clone(&member.provider))
            .collect()
    }

    fn publish_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.publish.lock().expect("publish lock poisoned")
    }
}

fn validate_id(id: &str) -> LoadBalancerResult<()> {
    if id.is_empty() {
        return Err(LoadBalancerError::InvalidArgument(
            "provider identity cannot be empty".to_string(),
        ));
    }
    Ok(())
}
