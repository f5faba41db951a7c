//! Data model shared between the selector, dispatcher and ledger.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An event as exposed by the host application, joined with its owner's
/// notification preferences. Read-only for this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Sole temporal anchor. Events without one never produce reminders.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub is_archived: bool,
    pub notifications_enabled: bool,
    /// Owner's delivery address (an email for the SMTP channel).
    pub destination: Option<String>,
}

impl ScheduledEvent {
    /// Owner wants reminders and there is somewhere to send them.
    pub fn is_notifiable(&self) -> bool {
        !self.is_deleted
            && !self.is_archived
            && self.notifications_enabled
            && self.destination().is_some()
    }

    /// Trimmed destination, `None` when missing or blank.
    pub fn destination(&self) -> Option<&str> {
        self.destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// Length of the event in whole minutes, rounded to the nearest minute.
    pub fn duration_minutes(&self) -> Option<i64> {
        let (start, end) = (self.start_time?, self.end_time?);
        if end <= start {
            return None;
        }
        let secs = (end - start).num_seconds() as f64;
        Some((secs / 60.0).round() as i64)
    }

    /// Ledger key for this event under the given lead time.
    pub fn trigger_key(&self, lead: Duration) -> Option<TriggerKey> {
        self.start_time.map(|start| TriggerKey {
            event_id: self.id.clone(),
            trigger_time: start - lead,
        })
    }
}

/// Composite ledger key: one reminder per (event, trigger instant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerKey {
    pub event_id: String,
    pub trigger_time: DateTime<Utc>,
}

impl std::fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.event_id, self.trigger_time.to_rfc3339())
    }
}

/// Outcome of one delivery attempt as stored in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Failed,
    Sent,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Sent => "sent",
        }
    }

    /// Sent is terminal; nothing may overwrite it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Sent)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failed" => Ok(DeliveryStatus::Failed),
            "sent" => Ok(DeliveryStatus::Sent),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// A write request against the ledger.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub key: TriggerKey,
    pub owner_id: String,
    pub destination: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
}

impl DeliveryOutcome {
    pub fn sent(key: TriggerKey, owner_id: &str, destination: &str) -> Self {
        Self {
            key,
            owner_id: owner_id.to_string(),
            destination: destination.to_string(),
            status: DeliveryStatus::Sent,
            error_message: None,
        }
    }

    pub fn failed(key: TriggerKey, owner_id: &str, destination: &str, error: impl Into<String>) -> Self {
        Self {
            key,
            owner_id: owner_id.to_string(),
            destination: destination.to_string(),
            status: DeliveryStatus::Failed,
            error_message: Some(error.into()),
        }
    }
}

/// What the ledger did with a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerWrite {
    /// Row created or a `failed` row overwritten.
    Applied,
    /// Row already `sent`; the write was dropped.
    IgnoredTerminal,
}

/// A persisted ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event_id: String,
    pub trigger_time: DateTime<Utc>,
    pub owner_id: String,
    pub destination: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query handed to an [`crate::traits::EventSource`].
#[derive(Debug, Clone, Copy)]
pub struct WindowQuery {
    /// Exclusive lower bound (the cycle's "now").
    pub after: DateTime<Utc>,
    /// Inclusive upper bound: now + lead + margin.
    pub until: DateTime<Utc>,
    /// Lead used to derive trigger keys for ledger exclusion.
    pub lead: Duration,
}

impl WindowQuery {
    pub fn new(now: DateTime<Utc>, lead: Duration, margin: Duration) -> Self {
        Self {
            after: now,
            until: now + lead + margin,
            lead,
        }
    }

    /// start_time ∈ (after, until]
    pub fn contains(&self, start: DateTime<Utc>) -> bool {
        start > self.after && start <= self.until
    }

    /// Every inclusion rule except the ledger check.
    pub fn admits(&self, event: &ScheduledEvent) -> bool {
        event.is_notifiable() && event.start_time.is_some_and(|s| self.contains(s))
    }
}

/// Summary of one select-then-dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerReport {
    pub dispatched_count: usize,
    pub delivered: usize,
    pub failed: usize,
    pub succeeded: bool,
}
