//! # Remindr Scheduler
//!
//! Upcoming-event reminders with exactly-once-per-trigger delivery.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval + manual trigger, single-flight)
//!   └── cycle
//!         ├── WindowSelector: start ∈ (now, now + lead + margin], no `sent` row
//!         └── for each candidate (ascending start, paced)
//!               └── Dispatcher → NotifyChannel (email, webhook)
//!                     └── ReminderLedger: (event, trigger_time) → failed | sent
//! ```
//!
//! The ledger's composite primary key plus a conditional upsert is what keeps
//! retries safe: `failed` rows are retried next tick, `sent` rows are final.
//! Only one scheduler instance may run against a database at a time.

pub mod dispatch;
pub mod engine;
pub mod notify;
pub mod persistence;
pub mod selector;

pub use dispatch::{DispatchResult, Dispatcher};
pub use engine::Scheduler;
pub use notify::{ReminderMessage, ReminderRenderer};
pub use persistence::{EventRecord, ReminderDb, UserRecord};
pub use selector::WindowSelector;
