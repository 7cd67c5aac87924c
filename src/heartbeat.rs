//! Periodic per-provider health probing.
//!
//! A [`HeartbeatMonitor`] owns one tokio task that waits the configured
//! initial delay, then probes its provider every interval and reports the
//! result to a [`HeartbeatSink`] (the availability tracker in practice).
//!
//! Stopping is best-effort: after [`HeartbeatMonitor::stop`] returns no new
//! tick starts, but a probe that is already running may still report once.
//! Sinks reject reports for providers they no longer track, and the monitor
//! exits quietly when that happens.

use crate::config::HeartbeatConfig;
use crate::error::{LoadBalancerError, LoadBalancerResult};
use crate::provider::Provider;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Receiver of heartbeat results.
pub trait HeartbeatSink: Send + Sync {
    /// Record one probe result for registration `generation` of a provider.
    ///
    /// # Errors
    ///
    /// Returns an error if that registration is no longer tracked; the
    /// reporting monitor stops on error.
    fn report(&self, provider_id: &str, generation: u64, alive: bool) -> LoadBalancerResult<()>;
}

/// Handle to a running heartbeat task for one provider.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    /// Identity of the probed provider.
    provider_id: String,
    /// Registration the monitor reports for.
    generation: u64,
    /// Set once the monitor is stopped or the task has exited.
    stopped: Arc<AtomicBool>,
    /// Number of reports delivered to the sink.
    beats: Arc<AtomicU64>,
    /// Shutdown signal sender.
    shutdown_tx: mpsc::Sender<()>,
    /// Background task.
    task: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Start probing registration `generation` of `provider` on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::InvalidArgument`] if the provider identity
    /// is empty or the interval is zero.
    pub fn start(
        provider: Arc<dyn Provider>,
        generation: u64,
        sink: Weak<dyn HeartbeatSink>,
        config: &HeartbeatConfig,
        runtime: &Handle,
    ) -> LoadBalancerResult<Self> {
        if provider.id().is_empty() {
            return Err(LoadBalancerError::InvalidArgument(
                "heartbeat provider identity cannot be empty".to_string(),
            ));
        }
        if config.interval.is_zero() {
            return Err(LoadBalancerError::InvalidArgument(
                "heartbeat interval must be positive".to_string(),
            ));
        }

        let provider_id = provider.id().to_string();
        let stopped = Arc::new(AtomicBool::new(false));
        let beats = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let task = HeartbeatTask {
            provider,
            generation,
            sink,
            config: *config,
            stopped: Arc::clone(&stopped),
            beats: Arc::clone(&beats),
            shutdown: shutdown_rx,
        };
        let task = runtime.spawn(task.run());

        debug!(
            provider = %provider_id,
            generation,
            initial_delay_ms = config.initial_delay.as_millis(),
            interval_ms = config.interval.as_millis(),
            "Started heartbeat monitor"
        );

        Ok(Self {
            provider_id,
            generation,
            stopped,
            beats,
            shutdown_tx,
            task,
        })
    }

    /// Identity of the probed provider.
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Registration the monitor reports for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the monitor was stopped or its task has exited.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of probe results delivered so far.
    #[must_use]
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }

    /// Stop the monitor. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.try_send(());
        self.task.abort();
        debug!(provider = %self.provider_id, "Stopped heartbeat monitor");
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct HeartbeatTask {
    provider: Arc<dyn Provider>,
    generation: u64,
    sink: Weak<dyn HeartbeatSink>,
    config: HeartbeatConfig,
    stopped: Arc<AtomicBool>,
    beats: Arc<AtomicU64>,
    shutdown: mpsc::Receiver<()>,
}

impl HeartbeatTask {
    async fn run(mut self) {
        let mut ticker = interval_at(
            Instant::now() + self.config.initial_delay,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    debug!(provider = self.provider.id(), "Heartbeat task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if self.stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    if !self.beat() {
                        break;
                    }
                }
            }
        }

        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Probe once and report. Returns `false` when the task should exit.
    fn beat(&self) -> bool {
        let Some(sink) = self.sink.upgrade() else {
            debug!(provider = self.provider.id(), "Heartbeat sink dropped");
            return false;
        };

        let alive = self.provider.check();
        match sink.report(self.provider.id(), self.generation, alive) {
            Ok(()) => {
                self.beats.fetch_add(1, Ordering::SeqCst);
                debug!(provider = self.provider.id(), alive, "Heartbeat");
                true
            },
            Err(e) => {
                debug!(
                    provider = self.provider.id(),
                    error = %e,
                    "Heartbeat report rejected, stopping monitor"
                );
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Reports {
        seen: Mutex<Vec<bool>>,
        reject: AtomicBool,
    }

    impl HeartbeatSink for Reports {
        fn report(
            &self,
            provider_id: &str,
            _generation: u64,
            alive: bool,
        ) -> LoadBalancerResult<()> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(LoadBalancerError::UnknownTraceable(provider_id.to_string()));
            }
            self.seen.lock().unwrap().push(alive);
            Ok(())
        }
    }

    fn config() -> HeartbeatConfig {
        HeartbeatConfig::new(Duration::from_secs(2), Duration::from_secs(2))
    }

    fn start(provider: &Arc<StaticProvider>, sink: &Arc<Reports>) -> HeartbeatMonitor {
        let sink: Arc<dyn HeartbeatSink> = sink.clone();
        HeartbeatMonitor::start(
            provider.clone(),
            1,
            Arc::downgrade(&sink),
            &config(),
            &Handle::current(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_then_interval() {
        let provider = Arc::new(StaticProvider::with_id("p1"));
        let sink = Arc::new(Reports::default());
        let monitor = start(&provider, &sink);

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(sink.seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*sink.seen.lock().unwrap(), vec![true]);

        provider.set_healthy(false);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*sink.seen.lock().unwrap(), vec![true, false]);
        assert_eq!(monitor.beats(), 2);
        assert_eq!(provider.check_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_ticks() {
        let provider = Arc::new(StaticProvider::with_id("p1"));
        let sink = Arc::new(Reports::default());
        let monitor = start(&provider, &sink);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        monitor.stop();
        assert!(monitor.is_stopped());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.seen.lock().unwrap().len(), 1);

        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_report_ends_task() {
        let provider = Arc::new(StaticProvider::with_id("p1"));
        let sink = Arc::new(Reports::default());
        sink.reject.store(true, Ordering::SeqCst);
        let monitor = start(&provider, &sink);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(monitor.is_stopped());
        assert_eq!(monitor.beats(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(provider.check_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sink_ends_task() {
        let provider = Arc::new(StaticProvider::with_id("p1"));
        let sink = Arc::new(Reports::default());
        let monitor = start(&provider, &sink);
        drop(sink);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(monitor.is_stopped());
        assert_eq!(provider.check_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let sink: Arc<dyn HeartbeatSink> = Arc::new(Reports::default());
        let result = HeartbeatMonitor::start(
            Arc::new(StaticProvider::with_id("p1")),
            1,
            Arc::downgrade(&sink),
            &HeartbeatConfig::new(Duration::from_secs(1), Duration::ZERO),
            &Handle::current(),
        );
        assert!(matches!(result, Err(LoadBalancerError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_empty_identity_rejected() {
        let sink: Arc<dyn HeartbeatSink> = Arc::new(Reports::default());
        let result = HeartbeatMonitor::start(
            Arc::new(StaticProvider::with_id("")),
            1,
            Arc::downgrade(&sink),
            &config(),
            &Handle::current(),
        );
        assert!(matches!(result, Err(LoadBalancerError::InvalidArgument(_))));
    }
}
