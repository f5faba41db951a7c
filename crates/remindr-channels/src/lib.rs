//! # Remindr Channels
//! Outbound notification channels.

pub mod email;
pub mod webhook;

pub use email::EmailChannel;
pub use webhook::WebhookChannel;
