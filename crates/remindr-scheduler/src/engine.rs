//! Scheduler engine. Owns the reminder loop lifecycle.
//!
//! Stopped → Running on `start`, back to Stopped on `stop`. The timer path
//! and `trigger_now` share one async guard so cycles never overlap inside
//! this process. Dispatch inside a cycle is sequential with a fixed pause
//! between sends to stay under the outbound channel's rate limits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use remindr_core::config::{RemindrConfig, SchedulerConfig};
use remindr_core::error::Result;
use remindr_core::traits::{EventSource, NotifyChannel, ReminderLedger};
use remindr_core::types::TriggerReport;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::dispatch::{DispatchResult, Dispatcher};
use crate::notify::ReminderRenderer;
use crate::selector::WindowSelector;

enum SchedulerState {
    Stopped,
    Running {
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
}

struct CycleRunner {
    selector: WindowSelector,
    dispatcher: Dispatcher,
    tick_interval: Duration,
    dispatch_delay: Duration,
    /// Single-flight guard shared by the timer and manual triggers.
    cycle_guard: tokio::sync::Mutex<()>,
}

/// The reminder scheduler.
pub struct Scheduler {
    runner: Arc<CycleRunner>,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    /// Assemble from parts. Fails if the timing config would leave gaps.
    pub fn new(selector: WindowSelector, dispatcher: Dispatcher, config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runner: Arc::new(CycleRunner {
                selector,
                dispatcher,
                tick_interval: config.tick_interval(),
                dispatch_delay: config.dispatch_delay(),
                cycle_guard: tokio::sync::Mutex::new(()),
            }),
            state: Mutex::new(SchedulerState::Stopped),
        })
    }

    /// Wire selector, dispatcher and renderer from the full config.
    pub fn from_config(
        events: Arc<dyn EventSource>,
        ledger: Arc<dyn ReminderLedger>,
        channel: Arc<dyn NotifyChannel>,
        config: &RemindrConfig,
    ) -> Result<Self> {
        let sched = &config.scheduler;
        let selector = WindowSelector::new(events, sched.lead(), sched.margin());
        let dispatcher = Dispatcher::new(
            channel,
            ledger,
            ReminderRenderer::new(&config.display),
            sched.lead(),
            sched.send_timeout(),
        );
        Self::new(selector, dispatcher, sched)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state(), SchedulerState::Running { .. })
    }

    /// Run one cycle right away, then one per tick. Must be called inside a
    /// tokio runtime. Returns false if already running.
    pub fn start(&self) -> bool {
        let mut state = self.state();
        if matches!(*state, SchedulerState::Running { .. }) {
            tracing::warn!("⚠️ Scheduler already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let runner = self.runner.clone();
        let handle = tokio::spawn(async move { runner.run_loop(shutdown_rx).await });

        tracing::info!(
            "⏰ Reminder scheduler started (check every {}s, channel: {})",
            self.runner.tick_interval.as_secs(),
            self.runner.dispatcher.channel_name()
        );
        *state = SchedulerState::Running { shutdown, handle };
        true
    }

    /// Stop arming new cycles. An in-flight cycle finishes before this
    /// returns. Returns false if the scheduler was not running.
    pub async fn stop(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state(), SchedulerState::Stopped);
        let SchedulerState::Running { shutdown, handle } = previous else {
            return false;
        };

        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            tracing::warn!("⚠️ Scheduler loop ended abnormally: {e}");
        }
        tracing::info!("🛑 Reminder scheduler stopped");
        true
    }

    /// One cycle outside the timer cadence (operator-initiated).
    pub async fn trigger_now(&self) -> TriggerReport {
        self.runner.run_cycle("manual").await
    }
}

impl CycleRunner {
    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    self.run_cycle("timer").await;
                }
            }
        }
    }

    async fn run_cycle(&self, source: &'static str) -> TriggerReport {
        let _guard = self.cycle_guard.lock().await;
        let cycle_id = uuid::Uuid::new_v4().simple().to_string();
        let span = tracing::info_span!("cycle", id = %&cycle_id[..8], source);

        async {
            let candidates = self.selector.select(Utc::now()).await;
            if candidates.is_empty() {
                tracing::debug!("No reminders due");
                return TriggerReport {
                    succeeded: true,
                    ..TriggerReport::default()
                };
            }

            tracing::info!(candidates = candidates.len(), "🔔 Reminders due");
            let mut report = TriggerReport::default();
            let total = candidates.len();

            for (i, event) in candidates.iter().enumerate() {
                match self.dispatcher.dispatch(event).await {
                    DispatchResult::Delivered => report.delivered += 1,
                    DispatchResult::Failed(_) => report.failed += 1,
                    DispatchResult::Skipped => {}
                }
                if i + 1 < total && !self.dispatch_delay.is_zero() {
                    tokio::time::sleep(self.dispatch_delay).await;
                }
            }

            report.dispatched_count = report.delivered + report.failed;
            report.succeeded = report.failed == 0;
            tracing::info!(
                dispatched = report.dispatched_count,
                delivered = report.delivered,
                failed = report.failed,
                "📣 Cycle finished"
            );
            report
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use remindr_core::types::{ScheduledEvent, WindowQuery};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::persistence::{EventRecord, ReminderDb, UserRecord};

    /// Counts queries, delegating to the real DB.
    struct CountingSource {
        db: Arc<ReminderDb>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventSource for CountingSource {
        async fn events_in_window(&self, query: &WindowQuery) -> Result<Vec<ScheduledEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.db.events_in_window(query).await
        }
    }

    struct SlowChannel {
        delay: Duration,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl NotifyChannel for SlowChannel {
        fn name(&self) -> &str {
            "slow"
        }

        async fn send(&self, _to: &str, _subject: &str, _text: &str, _html: &str) -> Result<bool> {
            tokio::time::sleep(self.delay).await;
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn verify(&self) -> Result<bool> {
            Ok(true)
        }
    }

    struct Fixture {
        db: Arc<ReminderDb>,
        source: Arc<CountingSource>,
        channel: Arc<SlowChannel>,
        scheduler: Scheduler,
    }

    fn fixture(send_delay: Duration) -> Fixture {
        let db = Arc::new(ReminderDb::open_in_memory().unwrap());
        db.upsert_user(&UserRecord {
            id: "u1".into(),
            email: Some("a@example.com".into()),
            notifications_enabled: true,
        })
        .unwrap();
        let source = Arc::new(CountingSource {
            db: db.clone(),
            calls: AtomicUsize::new(0),
        });
        let channel = Arc::new(SlowChannel {
            delay: send_delay,
            sends: AtomicUsize::new(0),
        });
        let scheduler =
            Scheduler::from_config(source.clone(), db.clone(), channel.clone(), &RemindrConfig::default())
                .unwrap();
        Fixture {
            db,
            source,
            channel,
            scheduler,
        }
    }

    fn add_event(db: &ReminderDb, id: &str, minutes_ahead: i64) {
        db.upsert_event(&EventRecord {
            id: id.into(),
            owner_id: "u1".into(),
            title: id.into(),
            description: None,
            location: None,
            start_time: Some(Utc::now() + ChronoDuration::minutes(minutes_ahead)),
            end_time: None,
            is_deleted: false,
            is_archived: false,
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_rejects_gappy_config() {
        let db = Arc::new(ReminderDb::open_in_memory().unwrap());
        let channel = Arc::new(SlowChannel {
            delay: Duration::ZERO,
            sends: AtomicUsize::new(0),
        });
        let mut config = RemindrConfig::default();
        config.scheduler.tick_interval_secs = 120;
        assert!(Scheduler::from_config(db.clone(), db, channel, &config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_immediately_then_per_tick() {
        let f = fixture(Duration::ZERO);
        assert!(f.scheduler.start());
        assert!(f.scheduler.is_running());
        assert!(!f.scheduler.start());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 2);

        assert!(f.scheduler.stop().await);
        assert!(!f.scheduler.is_running());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 2);
        assert!(!f.scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let f = fixture(Duration::from_secs(5));
        add_event(&f.db, "e1", 3);
        f.scheduler.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.channel.sends.load(Ordering::SeqCst), 0);

        f.scheduler.stop().await;
        assert_eq!(f.channel.sends.load(Ordering::SeqCst), 1);
        assert_eq!(f.db.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_manual_triggers_send_once() {
        let f = fixture(Duration::from_millis(200));
        add_event(&f.db, "e1", 3);

        let (a, b) = tokio::join!(f.scheduler.trigger_now(), f.scheduler.trigger_now());
        assert_eq!(a.dispatched_count + b.dispatched_count, 1);
        assert!(a.succeeded && b.succeeded);
        assert_eq!(f.channel.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_dispatch_delay_between_sends_only() {
        let f = fixture(Duration::ZERO);
        add_event(&f.db, "e1", 2);
        add_event(&f.db, "e2", 3);
        add_event(&f.db, "e3", 4);

        let started = tokio::time::Instant::now();
        let report = f.scheduler.trigger_now().await;
        assert_eq!(report.delivered, 3);
        // Two pauses of 1s between three sends, none after the last
        assert_eq!(started.elapsed().as_secs(), 2);
    }
}
