//! Notification dispatch: render, send, record.
//!
//! One call handles one event. Failures never propagate: a failed send is
//! written to the ledger as `failed` and the caller moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use remindr_core::traits::{NotifyChannel, ReminderLedger};
use remindr_core::types::{DeliveryOutcome, LedgerWrite, ScheduledEvent, TriggerKey};

use crate::notify::ReminderRenderer;

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Delivered,
    Failed(String),
    /// Candidate had no start time or destination by the time it got here.
    Skipped,
}

pub struct Dispatcher {
    channel: Arc<dyn NotifyChannel>,
    ledger: Arc<dyn ReminderLedger>,
    renderer: ReminderRenderer,
    lead: ChronoDuration,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn NotifyChannel>,
        ledger: Arc<dyn ReminderLedger>,
        renderer: ReminderRenderer,
        lead: ChronoDuration,
        send_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            ledger,
            renderer,
            lead,
            send_timeout,
        }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Deliver one reminder and record the outcome.
    pub async fn dispatch(&self, event: &ScheduledEvent) -> DispatchResult {
        let (Some(key), Some(destination)) = (event.trigger_key(self.lead), event.destination()) else {
            tracing::warn!(event_id = %event.id, "⚠️ Candidate without start time or destination, skipping");
            return DispatchResult::Skipped;
        };

        let trigger_time = key.trigger_time.to_rfc3339();
        tracing::info!(
            event_id = %event.id,
            trigger_time = %trigger_time,
            destination,
            channel = self.channel.name(),
            "📤 Sending reminder: '{}'",
            event.title
        );

        let message = self.renderer.render(event);
        let send = self.channel.send(
            destination,
            &message.subject,
            &message.text_body,
            &message.html_body,
        );

        let (outcome, result) = match tokio::time::timeout(self.send_timeout, send).await {
            Ok(Ok(true)) => {
                tracing::info!(event_id = %event.id, trigger_time = %trigger_time, "✅ Reminder delivered");
                (
                    DeliveryOutcome::sent(key, &event.owner_id, destination),
                    DispatchResult::Delivered,
                )
            }
            Ok(Ok(false)) => self.failure(event, key, destination, "channel reported non-delivery".into()),
            Ok(Err(e)) => self.failure(event, key, destination, e.to_string()),
            Err(_) => self.failure(
                event,
                key,
                destination,
                format!("send timed out after {}s", self.send_timeout.as_secs()),
            ),
        };

        match self.ledger.record_outcome(&outcome).await {
            Ok(LedgerWrite::Applied) => {}
            Ok(LedgerWrite::IgnoredTerminal) => {
                tracing::warn!(
                    event_id = %event.id,
                    trigger_time = %trigger_time,
                    status = %outcome.status,
                    "⚠️ Ledger already marked this trigger sent, outcome ignored"
                );
            }
            Err(e) => {
                // Known gap: a delivered reminder may be sent again next tick.
                tracing::error!(
                    event_id = %event.id,
                    trigger_time = %trigger_time,
                    status = %outcome.status,
                    error = %e,
                    "❌ Failed to record reminder outcome"
                );
            }
        }

        result
    }

    fn failure(
        &self,
        event: &ScheduledEvent,
        key: TriggerKey,
        destination: &str,
        error: String,
    ) -> (DeliveryOutcome, DispatchResult) {
        tracing::warn!(
            event_id = %event.id,
            trigger_time = %key.trigger_time.to_rfc3339(),
            destination,
            error = %error,
            "⚠️ Reminder delivery failed"
        );
        (
            DeliveryOutcome::failed(key, &event.owner_id, destination, error.clone()),
            DispatchResult::Failed(error),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use remindr_core::config::DisplayConfig;
    use remindr_core::error::{RemindrError, Result};
    use remindr_core::types::{DeliveryStatus, LedgerEntry};
    use std::sync::Mutex;

    use crate::persistence::ReminderDb;

    enum Reply {
        Accept,
        Reject,
        Error,
        Hang,
    }

    struct ScriptedChannel {
        reply: Reply,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedChannel {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotifyChannel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, destination: &str, subject: &str, _text: &str, _html: &str) -> Result<bool> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), subject.to_string()));
            match self.reply {
                Reply::Accept => Ok(true),
                Reply::Reject => Ok(false),
                Reply::Error => Err(RemindrError::delivery("connection reset")),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(true)
                }
            }
        }

        async fn verify(&self) -> Result<bool> {
            Ok(true)
        }
    }

    struct BrokenLedger;

    #[async_trait]
    impl ReminderLedger for BrokenLedger {
        async fn record_outcome(&self, _outcome: &DeliveryOutcome) -> Result<LedgerWrite> {
            Err(RemindrError::ledger("disk full"))
        }
        async fn entry(&self, _key: &TriggerKey) -> Result<Option<LedgerEntry>> {
            Ok(None)
        }
        async fn recent(&self, _limit: usize) -> Result<Vec<LedgerEntry>> {
            Ok(Vec::new())
        }
        async fn prune(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
            Ok(0)
        }
    }

    fn event() -> ScheduledEvent {
        ScheduledEvent {
            id: "evt-1".into(),
            owner_id: "u1".into(),
            title: "Standup".into(),
            description: None,
            location: None,
            start_time: Some(Utc::now() + ChronoDuration::minutes(5)),
            end_time: None,
            is_deleted: false,
            is_archived: false,
            notifications_enabled: true,
            destination: Some(" a@example.com ".into()),
        }
    }

    fn dispatcher(channel: Arc<ScriptedChannel>, ledger: Arc<dyn ReminderLedger>) -> Dispatcher {
        Dispatcher::new(
            channel,
            ledger,
            ReminderRenderer::new(&DisplayConfig::default()),
            ChronoDuration::minutes(5),
            Duration::from_secs(30),
        )
    }

    async fn status_of(db: &ReminderDb, e: &ScheduledEvent) -> Option<LedgerEntry> {
        db.entry(&e.trigger_key(ChronoDuration::minutes(5)).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_delivered_records_sent() {
        let db = Arc::new(ReminderDb::open_in_memory().unwrap());
        let channel = Arc::new(ScriptedChannel::new(Reply::Accept));
        let e = event();

        let result = dispatcher(channel.clone(), db.clone()).dispatch(&e).await;
        assert_eq!(result, DispatchResult::Delivered);

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![("a@example.com".to_string(), "⏰ Reminder: Standup".to_string())]);
        let entry = status_of(&db, &e).await.unwrap();
        assert_eq!(entry.status, DeliveryStatus::Sent);
        assert_eq!(entry.destination, "a@example.com");
    }

    #[tokio::test]
    async fn test_rejected_records_failed() {
        let db = Arc::new(ReminderDb::open_in_memory().unwrap());
        let e = event();
        let result = dispatcher(Arc::new(ScriptedChannel::new(Reply::Reject)), db.clone())
            .dispatch(&e)
            .await;
        assert!(matches!(result, DispatchResult::Failed(_)));

        let entry = status_of(&db, &e).await.unwrap();
        assert_eq!(entry.status, DeliveryStatus::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("channel reported non-delivery"));
    }

    #[tokio::test]
    async fn test_transport_error_text_captured() {
        let db = Arc::new(ReminderDb::open_in_memory().unwrap());
        let e = event();
        dispatcher(Arc::new(ScriptedChannel::new(Reply::Error)), db.clone())
            .dispatch(&e)
            .await;
        let entry = status_of(&db, &e).await.unwrap();
        assert!(entry.error_message.unwrap().contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_send_times_out() {
        let db = Arc::new(ReminderDb::open_in_memory().unwrap());
        let e = event();
        let result = dispatcher(Arc::new(ScriptedChannel::new(Reply::Hang)), db.clone())
            .dispatch(&e)
            .await;
        assert_eq!(result, DispatchResult::Failed("send timed out after 30s".into()));
        let entry = status_of(&db, &e).await.unwrap();
        assert_eq!(entry.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_ledger_error_does_not_hide_delivery() {
        let channel = Arc::new(ScriptedChannel::new(Reply::Accept));
        let result = dispatcher(channel, Arc::new(BrokenLedger)).dispatch(&event()).await;
        assert_eq!(result, DispatchResult::Delivered);
    }

    #[tokio::test]
    async fn test_missing_destination_skipped() {
        let db = Arc::new(ReminderDb::open_in_memory().unwrap());
        let channel = Arc::new(ScriptedChannel::new(Reply::Accept));
        let mut e = event();
        e.destination = None;
        let result = dispatcher(channel.clone(), db.clone()).dispatch(&e).await;
        assert_eq!(result, DispatchResult::Skipped);
        assert!(channel.sent.lock().unwrap().is_empty());
        assert!(status_of(&db, &e).await.is_none());
    }
}
