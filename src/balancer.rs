//! Load balancer facade.

use crate::availability::AvailabilityTracker;
use crate::config::{BasicValidator, ConfigLoader, LoadBalancerConfig};
use crate::error::{LoadBalancerError, LoadBalancerResult};
use crate::event::{AvailabilitySubject, RegistrySubject};
use crate::provider::Provider;
use crate::registry::ProviderRegistry;
use crate::scheduler::Scheduler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

/// Load balancer statistics.
#[derive(Debug, Default)]
pub struct LoadBalancerStats {
    /// Total selections made.
    pub total_selections: AtomicU64,
    /// Selections that returned a provider.
    pub successful_selections: AtomicU64,
    /// Selections with no available provider.
    pub empty_selections: AtomicU64,
}

impl LoadBalancerStats {
    /// Record a selection.
    pub fn record_selection(&self, success: bool) {
        self.total_selections.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_selections.fetch_add(1, Ordering::Relaxed);
        } else {
            self.empty_selections.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Registry, availability tracker and scheduler wired together.
///
/// The scheduler is attached to the registry subject before the tracker, so
/// its node exists before the provider's first heartbeat. It is also the
/// only built-in observer of the availability subject.
pub struct LoadBalancer {
    config: LoadBalancerConfig,
    registry: ProviderRegistry,
    tracker: Arc<AvailabilityTracker>,
    scheduler: Arc<Scheduler>,
    registry_subject: Arc<RegistrySubject>,
    availability_subject: Arc<AvailabilitySubject>,
    stats: Arc<LoadBalancerStats>,
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .field("stats", &self.stats)
            .finish()
    }
}

impl LoadBalancer {
    /// Create a load balancer on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`LoadBalancerError::Config`] if the configuration is invalid
    /// - [`LoadBalancerError::RuntimeUnavailable`] outside a tokio runtime
    pub fn new(config: LoadBalancerConfig) -> LoadBalancerResult<Self> {
        let runtime = Handle::try_current().map_err(|_| LoadBalancerError::RuntimeUnavailable)?;
        Self::with_runtime(config, runtime)
    }

    /// Create a load balancer whose heartbeats run on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::Config`] if the configuration is invalid.
    pub fn with_runtime(config: LoadBalancerConfig, runtime: Handle) -> LoadBalancerResult<Self> {
        ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .validate(&config)?;

        let registry_subject = Arc::new(RegistrySubject::new());
        let availability_subject = Arc::new(AvailabilitySubject::new());

        let scheduler = Arc::new(Scheduler::new(config.scheduler));
        let tracker = AvailabilityTracker::with_runtime(
            Arc::clone(&availability_subject),
            config.heartbeat,
            config.reinclusion,
            runtime,
        )?;

        registry_subject.attach(scheduler.clone());
        registry_subject.attach(tracker.clone());
        availability_subject.attach(scheduler.clone());

        let registry = ProviderRegistry::new(config.capacity, Arc::clone(&registry_subject))?;

        info!(
            capacity = config.capacity,
            scheduler = scheduler.name(),
            reinclusion = config.reinclusion.enabled,
            "Load balancer ready"
        );

        Ok(Self {
            config,
            registry,
            tracker,
            scheduler,
            registry_subject,
            availability_subject,
            stats: Arc::new(LoadBalancerStats::default()),
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &LoadBalancerConfig {
        &self.config
    }

    /// Get load balancer statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<LoadBalancerStats> {
        &self.stats
    }

    /// Name of the scheduling strategy.
    #[must_use]
    pub fn scheduler_name(&self) -> &'static str {
        self.scheduler.name()
    }

    /// The availability tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<AvailabilityTracker> {
        &self.tracker
    }

    /// The scheduler and its availability mirror.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Subject carrying registry events, for extra observers.
    #[must_use]
    pub fn registry_events(&self) -> &Arc<RegistrySubject> {
        &self.registry_subject
    }

    /// Subject carrying availability transitions, for extra observers.
    #[must_use]
    pub fn availability_events(&self) -> &Arc<AvailabilitySubject> {
        &self.availability_subject
    }

    /// Register a provider.
    ///
    /// # Errors
    ///
    /// See [`ProviderRegistry::register`].
    pub fn register(&self, provider: Arc<dyn Provider>) -> LoadBalancerResult<()> {
        self.registry.register(provider)
    }

    /// Register a batch of providers, all or nothing.
    ///
    /// # Errors
    ///
    /// See [`ProviderRegistry::register_all`].
    pub fn register_all<I>(&self, providers: I) -> LoadBalancerResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Provider>>,
    {
        self.registry.register_all(providers)
    }

    /// Unregister a provider.
    ///
    /// # Errors
    ///
    /// See [`ProviderRegistry::unregister`].
    pub fn unregister(&self, provider_id: &str) -> LoadBalancerResult<()> {
        self.registry.unregister(provider_id)
    }

    /// Check whether a provider is registered.
    #[must_use]
    pub fn is_registered(&self, provider_id: &str) -> bool {
        self.registry.is_registered(provider_id)
    }

    /// Snapshot of the registered providers.
    #[must_use]
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.registry.list_providers()
    }

    /// Exclude a provider from scheduling.
    ///
    /// # Errors
    ///
    /// - [`LoadBalancerError::InvalidArgument`] for an empty identity
    /// - [`LoadBalancerError::UnknownTraceable`] if the provider is not registered
    pub fn exclude(&self, provider_id: &str) -> LoadBalancerResult<()> {
        validate_id(provider_id)?;
        self.tracker.update_exclusion(provider_id, true)
    }

    /// Include a previously excluded provider.
    ///
    /// # Errors
    ///
    /// - [`LoadBalancerError::InvalidArgument`] for an empty identity
    /// - [`LoadBalancerError::UnknownTraceable`] if the provider is not registered
    pub fn include(&self, provider_id: &str) -> LoadBalancerResult<()> {
        validate_id(provider_id)?;
        self.tracker.update_exclusion(provider_id, false)
    }

    /// Whether a provider is excluded.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::UnknownTraceable`] if the provider is not
    /// registered.
    pub fn is_excluded(&self, provider_id: &str) -> LoadBalancerResult<bool> {
        self.tracker.is_excluded(provider_id)
    }

    /// Last reported liveness of a provider.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::UnknownTraceable`] if the provider is not
    /// registered.
    pub fn is_alive(&self, provider_id: &str) -> LoadBalancerResult<bool> {
        self.tracker.is_alive(provider_id)
    }

    /// Heartbeats still required before automatic re-inclusion.
    #[must_use]
    pub fn reinclusion_remaining(&self, provider_id: &str) -> Option<u32> {
        self.tracker.reinclusion_remaining(provider_id)
    }

    /// Next provider according to the scheduling strategy.
    #[must_use]
    pub fn get_provider(&self) -> Option<Arc<dyn Provider>> {
        let selected = self.scheduler.next();
        self.stats.record_selection(selected.is_some());
        selected
    }

    /// Response of the next provider, or `None` if none is available.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.get_provider().map(|provider| provider.get())
    }
}

fn validate_id(provider_id: &str) -> LoadBalancerResult<()> {
    if provider_id.is_empty() {
        return Err(LoadBalancerError::InvalidArgument(
            "provider identity cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerType;
    use crate::provider::StaticProvider;

    #[test]
    fn test_stats_recording() {
        let stats = LoadBalancerStats::default();

        stats.record_selection(true);
        stats.record_selection(true);
        stats.record_selection(false);

        assert_eq!(stats.total_selections.load(Ordering::Relaxed), 3);
        assert_eq!(stats.successful_selections.load(Ordering::Relaxed), 2);
        assert_eq!(stats.empty_selections.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_requires_runtime() {
        let result = LoadBalancer::new(LoadBalancerConfig::default());
        assert!(matches!(result, Err(LoadBalancerError::RuntimeUnavailable)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = LoadBalancer::new(LoadBalancerConfig::with_capacity(0));
        assert!(matches!(result, Err(LoadBalancerError::Config(_))));
    }

    #[tokio::test]
    async fn test_wiring() {
        let lb = LoadBalancer::new(
            LoadBalancerConfig::with_capacity(3).scheduler(SchedulerType::Random),
        )
        .unwrap();

        assert_eq!(lb.scheduler_name(), "random");
        assert_eq!(lb.registry_events().observer_count(), 2);
        assert_eq!(lb.availability_events().observer_count(), 1);
    }

    #[tokio::test]
    async fn test_exclude_validation() {
        let lb = LoadBalancer::new(LoadBalancerConfig::default()).unwrap();

        assert!(matches!(
            lb.exclude(""),
            Err(LoadBalancerError::InvalidArgument(_))
        ));
        assert!(matches!(
            lb.include(""),
            Err(LoadBalancerError::InvalidArgument(_))
        ));
        assert!(matches!(
            lb.exclude("missing"),
            Err(LoadBalancerError::UnknownTraceable(_))
        ));
    }

    #[tokio::test]
    async fn test_get_empty_records_stats() {
        let lb = LoadBalancer::new(LoadBalancerConfig::default()).unwrap();
        lb.register(Arc::new(StaticProvider::with_id("p1"))).unwrap();

        assert!(lb.get().is_none());
        assert_eq!(lb.stats().empty_selections.load(Ordering::Relaxed), 1);
    }
}
