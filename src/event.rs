//! Registry and availability events with their publish/subscribe subjects.
//!
//! Two independent channels exist: [`RegistrySubject`] carries membership
//! changes and [`AvailabilitySubject`] carries availability transitions.
//! Delivery is synchronous: `notify` returns once every observer attached at
//! the time of the call has seen the event. Observers are invoked on a
//! snapshot taken under the subject lock, never while holding it, so an
//! observer may attach or detach from inside a callback.

use crate::error::LoadBalancerResult;
use crate::provider::Provider;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::error;

/// Membership change published by the registry.
///
/// Every admission gets a fresh registry-wide `generation`. The matching
/// `Unregistered` event carries the same value, and the tracker stamps it on
/// every [`AvailabilityChanged`] for that registration.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// Provider was admitted.
    Registered {
        /// The admitted provider.
        provider: Arc<dyn Provider>,
        /// Generation of this registration.
        generation: u64,
    },
    /// Provider was removed.
    Unregistered {
        /// The removed provider.
        provider: Arc<dyn Provider>,
        /// Generation of the registration that ended.
        generation: u64,
    },
}

impl RegistryEvent {
    /// Admission of `provider` under `generation`.
    #[must_use]
    pub fn registered(provider: Arc<dyn Provider>, generation: u64) -> Self {
        Self::Registered {
            provider,
            generation,
        }
    }

    /// Removal of `provider`, ending registration `generation`.
    #[must_use]
    pub fn unregistered(provider: Arc<dyn Provider>, generation: u64) -> Self {
        Self::Unregistered {
            provider,
            generation,
        }
    }

    /// The provider the event refers to.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn Provider> {
        match self {
            Self::Registered { provider, .. } | Self::Unregistered { provider, .. } => provider,
        }
    }

    /// Registration generation the event refers to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::Registered { generation, .. } | Self::Unregistered { generation, .. } => {
                *generation
            },
        }
    }

    /// Identity of the provider the event refers to.
    #[must_use]
    pub fn provider_id(&self) -> &str {
        self.provider().id()
    }

    /// Short event name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::Unregistered { .. } => "unregistered",
        }
    }
}

/// Availability transition published by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityChanged {
    /// Provider identity.
    pub provider_id: String,
    /// Registration generation the transition belongs to.
    pub generation: u64,
    /// New availability (`alive && !excluded`).
    pub available: bool,
    /// Tracker-wide sequence number; later transitions carry larger values.
    pub sequence: u64,
}

/// Identity shared by every observer kind.
pub trait Observer: Send + Sync {
    /// Stable identity used as the subscription key.
    fn observer_id(&self) -> &str;
}

/// Receives registry events.
pub trait RegistryObserver: Observer {
    /// Handle a membership change.
    ///
    /// # Errors
    ///
    /// Returns an error if the observer's state disagrees with the event.
    fn on_registry_event(&self, event: &RegistryEvent) -> LoadBalancerResult<()>;
}

/// Receives availability transitions.
pub trait AvailabilityObserver: Observer {
    /// Handle an availability transition.
    fn on_availability_changed(&self, event: &AvailabilityChanged);
}

/// Observer set keyed by observer identity, kept in attach order.
pub struct Subject<O: ?Sized> {
    observers: RwLock<Vec<(String, Arc<O>)>>,
}

/// Subject for registry events.
pub type RegistrySubject = Subject<dyn RegistryObserver>;

/// Subject for availability transitions.
pub type AvailabilitySubject = Subject<dyn AvailabilityObserver>;

impl<O: Observer + ?Sized> Subject<O> {
    /// Create an empty subject.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Attach an observer.
    ///
    /// Attaching an identity that is already present replaces the earlier
    /// observer in place. Returns `true` if a replacement happened.
    pub fn attach(&self, observer: Arc<O>) -> bool {
        let id = observer.observer_id().to_string();
        let mut observers = self.observers.write().expect("observers lock poisoned");

        if let Some(slot) = observers.iter_mut().find(|(existing, _)| *existing == id) {
            slot.1 = observer;
            return true;
        }

        observers.push((id, observer));
        false
    }

    /// Detach the observer with the given identity.
    ///
    /// Returns `true` if an observer was removed.
    pub fn detach(&self, observer_id: &str) -> bool {
        let mut observers = self.observers.write().expect("observers lock poisoned");
        let before = observers.len();
        observers.retain(|(id, _)| id != observer_id);
        observers.len() != before
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().expect("observers lock poisoned").len()
    }

    fn snapshot(&self) -> Vec<Arc<O>> {
        self.observers
            .read()
            .expect("observers lock poisoned")
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }
}

impl<O: Observer + ?Sized> Default for Subject<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ?Sized> fmt::Debug for Subject<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self
            .observers
            .read()
            .map(|o| o.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default();
        f.debug_struct("Subject").field("observers", &ids).finish()
    }
}

impl Subject<dyn RegistryObserver> {
    /// Deliver a registry event to every observer.
    ///
    /// Every observer sees the event even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first observer error.
    pub fn notify(&self, event: &RegistryEvent) -> LoadBalancerResult<()> {
        let mut first_err = None;

        for observer in self.snapshot() {
            if let Err(e) = observer.on_registry_event(event) {
                error!(
                    observer = observer.observer_id(),
                    provider = event.provider_id(),
                    event = event.kind(),
                    error = %e,
                    "Registry observer failed"
                );
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

impl Subject<dyn AvailabilityObserver> {
    /// Deliver an availability transition to every observer.
    pub fn notify(&self, event: &AvailabilityChanged) {
        for observer in self.snapshot() {
            observer.on_availability_changed(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadBalancerError;
    use crate::provider::StaticProvider;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        id: String,
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Recorder {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                ..Default::default()
            })
        }

        fn failing(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                fail: true,
                ..Default::default()
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Observer for Recorder {
        fn observer_id(&self) -> &str {
            &self.id
        }
    }

    impl RegistryObserver for Recorder {
        fn on_registry_event(&self, event: &RegistryEvent) -> LoadBalancerResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", event.kind(), event.provider_id()));
            if self.fail {
                return Err(LoadBalancerError::InternalInconsistency(self.id.clone()));
            }
            Ok(())
        }
    }

    impl AvailabilityObserver for Recorder {
        fn on_availability_changed(&self, event: &AvailabilityChanged) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}={}", event.provider_id, event.available));
        }
    }

    fn registered(id: &str) -> RegistryEvent {
        RegistryEvent::registered(Arc::new(StaticProvider::with_id(id)), 1)
    }

    #[test]
    fn test_notify_all_observers() {
        let subject = RegistrySubject::new();
        let a = Recorder::new("a");
        let b = Recorder::new("b");
        subject.attach(a.clone());
        subject.attach(b.clone());

        subject.notify(&registered("p1")).unwrap();

        assert_eq!(a.seen(), vec!["registered:p1"]);
        assert_eq!(b.seen(), vec!["registered:p1"]);
    }

    #[test]
    fn test_attach_same_id_replaces() {
        let subject = RegistrySubject::new();
        let first = Recorder::new("same");
        let second = Recorder::new("same");

        assert!(!subject.attach(first.clone()));
        assert!(subject.attach(second.clone()));
        assert_eq!(subject.observer_count(), 1);

        subject.notify(&registered("p1")).unwrap();
        assert!(first.seen().is_empty());
        assert_eq!(second.seen().len(), 1);
    }

    #[test]
    fn test_detach() {
        let subject = AvailabilitySubject::new();
        let a = Recorder::new("a");
        subject.attach(a.clone());

        assert!(subject.detach("a"));
        assert!(!subject.detach("a"));

        subject.notify(&AvailabilityChanged {
            provider_id: "p1".to_string(),
            generation: 1,
            available: true,
            sequence: 1,
        });
        assert!(a.seen().is_empty());
    }

    #[test]
    fn test_failing_observer_does_not_starve_others() {
        let subject = RegistrySubject::new();
        let bad = Recorder::failing("bad");
        let good = Recorder::new("good");
        subject.attach(bad.clone());
        subject.attach(good.clone());

        let result = subject.notify(&registered("p1"));

        assert!(matches!(
            result,
            Err(LoadBalancerError::InternalInconsistency(_))
        ));
        assert_eq!(good.seen(), vec!["registered:p1"]);
    }

    #[test]
    fn test_availability_delivery() {
        let subject = AvailabilitySubject::new();
        let a = Recorder::new("a");
        subject.attach(a.clone());

        subject.notify(&AvailabilityChanged {
            provider_id: "p1".to_string(),
            generation: 1,
            available: false,
            sequence: 3,
        });

        assert_eq!(a.seen(), vec!["p1=false"]);
    }
}
