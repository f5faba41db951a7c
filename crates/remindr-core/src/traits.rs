//! Seams between the reminder pipeline and the outside world.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{DeliveryOutcome, LedgerEntry, LedgerWrite, ScheduledEvent, TriggerKey, WindowQuery};

/// Read access to the host application's events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events whose start falls inside the window, that pass the owner and
    /// flag filters, and that have no `sent` ledger row for their trigger key.
    async fn events_in_window(&self, query: &WindowQuery) -> Result<Vec<ScheduledEvent>>;
}

/// Durable record of delivery outcomes keyed by (event, trigger time).
#[async_trait]
pub trait ReminderLedger: Send + Sync {
    /// Atomic insert-or-update. A `sent` row is never overwritten.
    async fn record_outcome(&self, outcome: &DeliveryOutcome) -> Result<LedgerWrite>;

    async fn entry(&self, key: &TriggerKey) -> Result<Option<LedgerEntry>>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>>;

    /// Drop rows whose trigger time is before `cutoff`. Returns rows removed.
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Outbound notification channel (SMTP, webhook, ...).
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(false)` means the channel answered but did not accept the message.
    async fn send(&self, destination: &str, subject: &str, text_body: &str, html_body: &str) -> Result<bool>;

    /// Startup readiness probe.
    async fn verify(&self) -> Result<bool>;
}
