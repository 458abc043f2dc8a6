//! Debounce controller - the polling loop that confirms state changes
//!
//! # Cycle
//!
//! ```text
//! IDLE ──(poll interval elapsed)──> RESOLVING
//! RESOLVING ──(equal to confirmed)──> IDLE
//! RESOLVING ──(differs)──> TENTATIVE ──(settle delay)──> CONFIRMING
//! CONFIRMING ──(still differs)──> publish, IDLE
//! CONFIRMING ──(back to confirmed)──> drop candidate, IDLE
//! ```
//!
//! A change is rechecked exactly once. Only one cycle runs at a time: the
//! loop awaits the settle-delay recheck before it looks at anything else.
//! Cache invalidations that arrive while settling are applied before the
//! recheck.
//!
//! The first resolved state is always published, even when it equals the
//! initial idle state, so retained messages from a previous run are
//! replaced.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::watcher::Invalidation;
use crate::config::MonitorConfig;
use crate::publisher::{Publisher, StateMessage, Topics};
use crate::resolver::StateResolver;
use crate::state::AudioState;

/// Result of one [`Monitor::cycle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Poll interval has not elapsed since the last resolution
    Skipped,
    /// Resolved state equals the confirmed state
    Unchanged,
    /// State was published (a confirmed change or the startup snapshot)
    Confirmed(AudioState),
    /// Change vanished during the settle delay
    Reverted,
    /// Resolution failed; nothing changed
    Failed,
}

/// Owns the confirmed state and drives resolution
pub struct Monitor {
    resolver: StateResolver,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
    config: MonitorConfig,
    confirmed: AudioState,
    /// Set once anything has been published
    announced: bool,
    last_resolution: Option<Instant>,
    invalidations: Option<mpsc::Receiver<Invalidation>>,
}

impl Monitor {
    pub fn new(
        resolver: StateResolver,
        publisher: Arc<dyn Publisher>,
        topics: Topics,
        config: MonitorConfig,
    ) -> Self {
        Self {
            resolver,
            publisher,
            topics,
            config,
            confirmed: AudioState::idle(),
            announced: false,
            last_resolution: None,
            invalidations: None,
        }
    }

    /// Last confirmed (published) state
    pub fn confirmed(&self) -> &AudioState {
        &self.confirmed
    }

    /// Drop cached evidence after a watched log changed
    pub fn invalidate(&self) {
        trace!("invalidating read cache");
        self.resolver.cache().clear();
    }

    /// Apply invalidations queued since the last look
    fn drain_invalidations(&mut self) {
        let Some(rx) = self.invalidations.as_mut() else {
            return;
        };
        let mut pending = false;
        while rx.try_recv().is_ok() {
            pending = true;
        }
        if pending {
            self.invalidate();
        }
    }

    /// Run one resolve/settle/confirm cycle
    pub async fn cycle(&mut self) -> CycleOutcome {
        let now = Instant::now();
        if let Some(last) = self.last_resolution {
            if now.duration_since(last) < self.config.poll_interval() {
                trace!("poll interval not elapsed, skipping resolution");
                return CycleOutcome::Skipped;
            }
        }
        self.last_resolution = Some(now);
        self.drain_invalidations();

        let candidate = match self.resolver.resolve().await {
            Ok(state) => state,
            Err(e) => {
                warn!("State resolution failed: {}", e);
                return CycleOutcome::Failed;
            }
        };

        if candidate == self.confirmed {
            if self.announced {
                return CycleOutcome::Unchanged;
            }
            info!("🎵 Initial audio state: {}", candidate);
            return self.confirm(candidate).await;
        }

        debug!(candidate = %candidate, "tentative state change, settling");
        tokio::time::sleep(self.config.settle_delay()).await;
        self.drain_invalidations();

        let recheck = match self.resolver.resolve().await {
            Ok(state) => state,
            Err(e) => {
                warn!("State recheck failed: {}", e);
                return CycleOutcome::Failed;
            }
        };

        if recheck == self.confirmed && self.announced {
            debug!(candidate = %candidate, "state change reverted during settle delay");
            return CycleOutcome::Reverted;
        }

        info!(
            pid = ?recheck.owner_pid(),
            "🎵 Audio state changed: {} (was: {})",
            recheck,
            self.confirmed
        );
        self.confirm(recheck).await
    }

    async fn confirm(&mut self, state: AudioState) -> CycleOutcome {
        self.publisher
            .publish(&StateMessage::new(&self.topics, &state))
            .await;
        self.announced = true;
        self.confirmed = state.clone();
        CycleOutcome::Confirmed(state)
    }

    /// Poll until `shutdown` resolves
    ///
    /// Resolution runs whenever the poll interval has elapsed and after
    /// each cache invalidation. A closed invalidation channel only stops
    /// invalidations, not polling. Shutdown interrupts a cycle in flight.
    pub async fn run(
        mut self,
        invalidations: mpsc::Receiver<Invalidation>,
        shutdown: impl Future<Output = ()>,
    ) -> AudioState {
        info!(
            "Monitoring audio playback (poll {:?}, settle {:?}) via '{}' publisher",
            self.config.poll_interval(),
            self.config.settle_delay(),
            self.publisher.name()
        );

        tokio::pin!(shutdown);
        self.invalidations = Some(invalidations);

        loop {
            let next_poll = self
                .last_resolution
                .map(|last| last + self.config.poll_interval())
                .unwrap_or_else(Instant::now);

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping monitor loop");
                    break;
                }
                received = next_invalidation(&mut self.invalidations) => {
                    match received {
                        Some(Invalidation) => self.invalidate(),
                        None => {
                            debug!("Invalidation channel closed");
                            self.invalidations = None;
                            continue;
                        }
                    }
                }
                _ = tokio::time::sleep_until(next_poll) => {}
            }

            let outcome = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received during resolution, stopping monitor loop");
                    break;
                }
                outcome = self.cycle() => outcome,
            };

            if outcome == CycleOutcome::Failed {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Shutdown signal received, stopping monitor loop");
                        break;
                    }
                    _ = tokio::time::sleep(self.config.error_backoff()) => {}
                }
            }
        }

        self.confirmed
    }
}

/// Next invalidation; never resolves once the channel is gone
async fn next_invalidation(
    invalidations: &mut Option<mpsc::Receiver<Invalidation>>,
) -> Option<Invalidation> {
    match invalidations {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ReadCache;
    use crate::error::ResolveError;
    use crate::evidence::{Evidence, Reading};
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Serves a scripted sequence of owner PIDs; the last one repeats
    struct ScriptedEvidence {
        pids: Mutex<VecDeque<Option<&'static str>>>,
        fail_next: Mutex<bool>,
    }

    impl ScriptedEvidence {
        fn new(pids: &[Option<&'static str>]) -> Self {
            Self {
                pids: Mutex::new(pids.iter().copied().collect()),
                fail_next: Mutex::new(false),
            }
        }
    }

    async fn join_error() -> tokio::task::JoinError {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        handle.await.unwrap_err()
    }

    #[async_trait]
    impl Evidence for ScriptedEvidence {
        async fn owner_pid(&self) -> Result<Option<String>, ResolveError> {
            let fail = std::mem::take(&mut *self.fail_next.lock());
            if fail {
                return Err(ResolveError::Task {
                    reader: "device",
                    source: join_error().await,
                });
            }
            let mut pids = self.pids.lock();
            let pid = if pids.len() > 1 {
                pids.pop_front().flatten()
            } else {
                pids.front().copied().flatten()
            };
            Ok(pid.map(str::to_string))
        }

        async fn cmdline(&self, _pid: &str) -> Result<Option<String>, ResolveError> {
            Ok(Some("aplay".to_string()))
        }

        async fn spotify_track(&self) -> Result<Option<String>, ResolveError> {
            Ok(None)
        }

        async fn airplay_device(&self) -> Result<String, ResolveError> {
            Ok(String::new())
        }

        async fn radio(&self) -> Result<Reading, ResolveError> {
            Ok(Reading::none())
        }
    }

    /// Spotify owns the device; the logged track can be switched
    struct TrackEvidence {
        track: Mutex<String>,
    }

    #[async_trait]
    impl Evidence for TrackEvidence {
        async fn owner_pid(&self) -> Result<Option<String>, ResolveError> {
            Ok(Some("10".to_string()))
        }

        async fn cmdline(&self, _pid: &str) -> Result<Option<String>, ResolveError> {
            Ok(Some("/usr/bin/librespot".to_string()))
        }

        async fn spotify_track(&self) -> Result<Option<String>, ResolveError> {
            Ok(Some(self.track.lock().clone()))
        }

        async fn airplay_device(&self) -> Result<String, ResolveError> {
            Ok(String::new())
        }

        async fn radio(&self) -> Result<Reading, ResolveError> {
            Ok(Reading::none())
        }
    }

    /// Device reader that never answers
    struct StuckEvidence;

    #[async_trait]
    impl Evidence for StuckEvidence {
        async fn owner_pid(&self) -> Result<Option<String>, ResolveError> {
            std::future::pending().await
        }

        async fn cmdline(&self, _pid: &str) -> Result<Option<String>, ResolveError> {
            Ok(None)
        }

        async fn spotify_track(&self) -> Result<Option<String>, ResolveError> {
            Ok(None)
        }

        async fn airplay_device(&self) -> Result<String, ResolveError> {
            Ok(String::new())
        }

        async fn radio(&self) -> Result<Reading, ResolveError> {
            Ok(Reading::none())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        messages: Mutex<Vec<StateMessage>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(&self, message: &StateMessage) {
            self.messages.lock().push(message.clone());
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    fn monitor_for(evidence: Arc<dyn Evidence>, publisher: Arc<RecordingPublisher>) -> Monitor {
        let resolver = StateResolver::new(evidence, ReadCache::new(Duration::from_secs(5)));
        Monitor::new(
            resolver,
            publisher,
            Topics::new("source", "details"),
            MonitorConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_change_is_not_published() {
        let evidence = Arc::new(ScriptedEvidence::new(&[None, Some("42"), None]));
        let publisher = Arc::new(RecordingPublisher::default());
        let mut monitor = monitor_for(evidence, publisher.clone());

        assert!(matches!(monitor.cycle().await, CycleOutcome::Confirmed(_)));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(monitor.cycle().await, CycleOutcome::Reverted);
        assert_eq!(publisher.messages.lock().len(), 1);
        assert_eq!(monitor.confirmed(), &AudioState::idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_startup_is_published_once() {
        let evidence = Arc::new(ScriptedEvidence::new(&[None]));
        let publisher = Arc::new(RecordingPublisher::default());
        let mut monitor = monitor_for(evidence, publisher.clone());

        assert_eq!(
            monitor.cycle().await,
            CycleOutcome::Confirmed(AudioState::idle())
        );
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(monitor.cycle().await, CycleOutcome::Unchanged);

        // Empty values overwrite whatever a previous run left retained
        let messages = publisher.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].source_value, "");
        assert_eq!(messages[0].detail_value, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_change_is_published_once() {
        let evidence = Arc::new(ScriptedEvidence::new(&[Some("42")]));
        let publisher = Arc::new(RecordingPublisher::default());
        let mut monitor = monitor_for(evidence, publisher.clone());

        let outcome = monitor.cycle().await;
        assert!(matches!(outcome, CycleOutcome::Confirmed(_)));
        assert_eq!(monitor.confirmed().detail(), Some("PID: 42"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(monitor.cycle().await, CycleOutcome::Unchanged);

        let messages = publisher.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].source_value, "Unknown");
        assert_eq!(messages[0].detail_value, "PID: 42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_publishes_newest_state() {
        // Candidate 42, recheck 43: both differ from idle, 43 wins
        let evidence = Arc::new(ScriptedEvidence::new(&[Some("42"), Some("43")]));
        let publisher = Arc::new(RecordingPublisher::default());
        let mut monitor = monitor_for(evidence, publisher.clone());

        monitor.cycle().await;
        assert_eq!(monitor.confirmed().owner_pid(), Some("43"));
        assert_eq!(publisher.messages.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_throttles_resolution() {
        let evidence = Arc::new(ScriptedEvidence::new(&[None]));
        let publisher = Arc::new(RecordingPublisher::default());
        let mut monitor = monitor_for(evidence, publisher);

        assert!(matches!(monitor.cycle().await, CycleOutcome::Confirmed(_)));
        tokio::time::advance(Duration::from_millis(1_999)).await;
        assert_eq!(monitor.cycle().await, CycleOutcome::Skipped);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(monitor.cycle().await, CycleOutcome::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_confirmed_state() {
        let evidence = Arc::new(ScriptedEvidence::new(&[Some("42")]));
        let publisher = Arc::new(RecordingPublisher::default());
        let mut monitor = monitor_for(evidence.clone(), publisher.clone());

        *evidence.fail_next.lock() = true;
        assert_eq!(monitor.cycle().await, CycleOutcome::Failed);
        assert_eq!(monitor.confirmed(), &AudioState::idle());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(monitor.cycle().await, CycleOutcome::Confirmed(_)));
        assert_eq!(publisher.messages.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_clears_cache() {
        let evidence = Arc::new(ScriptedEvidence::new(&[None]));
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = monitor_for(evidence, publisher);

        monitor
            .resolver
            .cache()
            .set("spotify", Reading::none());
        monitor.invalidate();
        assert!(monitor.resolver.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown() {
        let evidence = Arc::new(ScriptedEvidence::new(&[None, None, Some("7")]));
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = monitor_for(evidence, publisher.clone());

        let (inval_tx, inval_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(monitor.run(inval_rx, async {
            let _ = stop_rx.await;
        }));

        inval_tx.send(Invalidation).await.unwrap();
        drop(inval_tx);
        tokio::time::sleep(Duration::from_secs(10)).await;
        stop_tx.send(()).unwrap();

        let confirmed = task.await.unwrap();
        assert_eq!(confirmed.owner_pid(), Some("7"));
        // Idle at startup, then PID 7
        let messages = publisher.messages.lock();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].source_value, "");
        assert_eq!(messages[1].detail_value, "PID: 7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_settle_reaches_recheck() {
        let evidence = Arc::new(TrackEvidence {
            track: Mutex::new("A".to_string()),
        });
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = monitor_for(evidence.clone(), publisher.clone());

        let (inval_tx, inval_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(monitor.run(inval_rx, async {
            let _ = stop_rx.await;
        }));

        // First resolution caches "A", then the settle delay starts
        tokio::time::sleep(Duration::from_millis(250)).await;
        *evidence.track.lock() = "B".to_string();
        inval_tx.try_send(Invalidation).unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        let details: Vec<String> = publisher
            .messages
            .lock()
            .iter()
            .map(|m| m.detail_value.clone())
            .collect();
        assert_eq!(details, vec!["B".to_string()]);

        stop_tx.send(()).unwrap();
        let confirmed = task.await.unwrap();
        assert_eq!(confirmed.detail(), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_stuck_resolution() {
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = monitor_for(Arc::new(StuckEvidence), publisher.clone());

        let (_inval_tx, inval_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(monitor.run(inval_rx, async {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).unwrap();

        let confirmed = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("monitor did not stop while resolution was stuck")
            .unwrap();
        assert_eq!(confirmed, AudioState::idle());
        assert!(publisher.messages.lock().is_empty());
    }
}
