//! One-shot user notices.
//!
//! Errors and successes travel on a single unbounded channel; each notice is
//! delivered exactly once to whoever holds the receiver.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    Success(String),
}

pub type NoticeReceiver = UnboundedReceiver<Notice>;

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: UnboundedSender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Self, NoticeReceiver) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(notice = %message, "Surfacing error notice");
        // A dropped receiver means nobody is listening; the log line above remains.
        let _ = self.tx.send(Notice::Error(message));
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        info!(notice = %message, "Surfacing success notice");
        let _ = self.tx.send(Notice::Success(message));
    }
}
