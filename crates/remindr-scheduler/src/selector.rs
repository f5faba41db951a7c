//! Window Selector — which events need a reminder this cycle.
//!
//! Stateless: every call is a fresh query against the event source. Query
//! failures degrade to an empty candidate list so a bad tick never takes the
//! scheduler down; the next tick retries naturally.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use remindr_core::traits::EventSource;
use remindr_core::types::{ScheduledEvent, WindowQuery};

pub struct WindowSelector {
    source: Arc<dyn EventSource>,
    lead: Duration,
    margin: Duration,
}

impl WindowSelector {
    pub fn new(source: Arc<dyn EventSource>, lead: Duration, margin: Duration) -> Self {
        Self { source, lead, margin }
    }

    pub fn lead(&self) -> Duration {
        self.lead
    }

    pub fn window(&self, now: DateTime<Utc>) -> WindowQuery {
        WindowQuery::new(now, self.lead, self.margin)
    }

    /// Candidates for `now`, earliest start first.
    pub async fn select(&self, now: DateTime<Utc>) -> Vec<ScheduledEvent> {
        let query = self.window(now);
        let mut events = match self.source.events_in_window(&query).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, "❌ Candidate query failed, skipping this cycle");
                return Vec::new();
            }
        };

        let fetched = events.len();
        events.retain(|e| query.admits(e));
        if events.len() < fetched {
            tracing::warn!(
                dropped = fetched - events.len(),
                "⚠️ Event source returned rows outside the reminder window"
            );
        }
        events.sort_by_key(|e| e.start_time);

        tracing::debug!(
            candidates = events.len(),
            after = %query.after.to_rfc3339(),
            until = %query.until.to_rfc3339(),
            "🔎 Window selected"
        );
        events
    }
}
