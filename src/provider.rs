//! Backend providers.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

/// A backend unit of work handed out by the balancer.
///
/// Providers are interchangeable; the balancer only needs a stable identity,
/// the response operation and a boolean health probe. The probe is invoked
/// synchronously from a heartbeat task, so it must not block indefinitely.
pub trait Provider: Send + Sync + fmt::Debug {
    /// Stable, globally unique identity.
    fn id(&self) -> &str;

    /// Produce this provider's response.
    fn get(&self) -> String;

    /// Health probe. `false` is normal data, not an error.
    fn check(&self) -> bool;
}

/// In-process provider with a random identity and a toggleable health flag.
#[derive(Debug)]
pub struct StaticProvider {
    id: String,
    healthy: AtomicBool,
    served: AtomicU64,
    checks: AtomicU64,
}

impl StaticProvider {
    /// Create a healthy provider with a fresh v4 UUID identity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create a healthy provider with an explicit identity.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            healthy: AtomicBool::new(true),
            served: AtomicU64::new(0),
            checks: AtomicU64::new(0),
        }
    }

    /// Set the result future health probes will return.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Current health flag.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Number of times `get` was called.
    #[must_use]
    pub fn served_count(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Number of health probes performed.
    #[must_use]
    pub fn check_count(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for StaticProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self) -> String {
        self.served.fetch_add(1, Ordering::Relaxed);
        self.id.clone()
    }

    fn check(&self) -> bool {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.is_healthy()
    }
}
