//! # Remindr Core
//! Shared data model, traits, configuration and errors.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RemindrConfig;
pub use error::{RemindrError, Result};
pub use traits::{EventSource, NotifyChannel, ReminderLedger};
pub use types::{
    DeliveryOutcome, DeliveryStatus, LedgerEntry, LedgerWrite, ScheduledEvent, TriggerKey,
    TriggerReport, WindowQuery,
};
