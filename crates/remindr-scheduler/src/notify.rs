//! Reminder content — subject, plain text and HTML bodies for one event.
//! Plain templating only; no per-owner content policy.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use remindr_core::config::DisplayConfig;
use remindr_core::types::ScheduledEvent;
use serde::{Deserialize, Serialize};

/// Marker that prefixes every reminder subject.
pub const SUBJECT_MARKER: &str = "⏰ Reminder:";

/// A rendered reminder, ready for any channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Renders events into messages using the configured display timezone.
#[derive(Debug, Clone)]
pub struct ReminderRenderer {
    offset: FixedOffset,
    time_format: String,
}

impl ReminderRenderer {
    pub fn new(config: &DisplayConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| {
            tracing::warn!(
                "⚠️ utc_offset_minutes {} out of range, falling back to UTC",
                config.utc_offset_minutes
            );
            Utc.fix()
        });
        // An invalid strftime item would make Display fail mid-render
        let time_format = if StrftimeItems::new(&config.time_format).any(|i| matches!(i, Item::Error)) {
            tracing::warn!("⚠️ Invalid display.time_format '{}', using default", config.time_format);
            DisplayConfig::default().time_format
        } else {
            config.time_format.clone()
        };
        Self { offset, time_format }
    }

    fn local(&self, t: DateTime<Utc>) -> String {
        format!(
            "{} (UTC{})",
            t.with_timezone(&self.offset).format(&self.time_format),
            self.offset
        )
    }

    pub fn render(&self, event: &ScheduledEvent) -> ReminderMessage {
        let subject = format!("{SUBJECT_MARKER} {}", event.title);
        let start = event
            .start_time
            .map(|t| self.local(t))
            .unwrap_or_else(|| "unscheduled".into());
        let end = event.end_time.map(|t| self.local(t));
        let duration = event.duration_minutes();
        let location = non_blank(event.location.as_deref());
        let description = non_blank(event.description.as_deref());

        let mut text = format!("Your event \"{}\" is starting soon.\n\nStarts: {start}\n", event.title);
        if let Some(end) = &end {
            text.push_str(&format!("Ends: {end}\n"));
        }
        if let Some(mins) = duration {
            text.push_str(&format!("Duration: {mins} minutes\n"));
        }
        if let Some(loc) = location {
            text.push_str(&format!("Location: {loc}\n"));
        }
        if let Some(desc) = description {
            text.push_str(&format!("\n{desc}\n"));
        }

        let mut html = format!(
            "<h2>{}</h2>\n<p>Your event is starting soon.</p>\n<ul>\n<li><strong>Starts:</strong> {}</li>\n",
            escape_html(&event.title),
            escape_html(&start)
        );
        if let Some(end) = &end {
            html.push_str(&format!("<li><strong>Ends:</strong> {}</li>\n", escape_html(end)));
        }
        if let Some(mins) = duration {
            html.push_str(&format!("<li><strong>Duration:</strong> {mins} minutes</li>\n"));
        }
        if let Some(loc) = location {
            html.push_str(&format!("<li><strong>Location:</strong> {}</li>\n", escape_html(loc)));
        }
        html.push_str("</ul>\n");
        if let Some(desc) = description {
            html.push_str(&format!(
                "<p>{}</p>\n",
                escape_html(desc).replace('\n', "<br>")
            ));
        }

        ReminderMessage {
            subject,
            text_body: text,
            html_body: html,
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Escape text for inclusion in HTML element content.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
