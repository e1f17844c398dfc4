//! Notifier that records instead of sending.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub mentions: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Message texts in send order.
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|n| n.message.clone()).collect()
    }

    /// Messages containing `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.messages().into_iter().filter(|m| m.contains(needle)).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str, mentions: &[String]) {
        self.sent.lock().push(Notification {
            message: message.to_string(),
            mentions: mentions.to_vec(),
        });
    }
}
