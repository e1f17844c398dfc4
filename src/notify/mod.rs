//! Operator notifications.
//!
//! # Data Flow
//! ```text
//! health / backup / panic flush
//!     → Notifier::notify(message, mentions)
//!     → webhook.rs (chat robot webhook) or LogNotifier (no webhook configured)
//! ```
//!
//! # Design Decisions
//! - Delivery failures are logged and swallowed; a failed alert never fails a
//!   check cycle
//! - Callers pass fully formatted text; rendering lives with the caller

pub mod webhook;

use async_trait::async_trait;
use tracing::info;

pub use webhook::WebhookNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `message`, mentioning the given operator handles.
    async fn notify(&self, message: &str, mentions: &[String]);
}

/// Writes notifications to the log instead of a chat channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, mentions: &[String]) {
        info!(mentions = ?mentions, "{}", message);
    }
}
