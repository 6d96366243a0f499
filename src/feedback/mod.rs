//! User feedback for submission outcomes
//!
//! Sinks are fire-and-forget: the pipeline never waits on them and never
//! sees their failures.

mod telegram;

pub use telegram::TelegramFeedback;

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Success,
    Error,
}

/// Somewhere the user learns how their submission went
pub trait FeedbackSink: Send + Sync {
    fn notify(&self, kind: FeedbackKind, message: &str);
}

/// Writes feedback to the service log
pub struct LogFeedback;

impl FeedbackSink for LogFeedback {
    fn notify(&self, kind: FeedbackKind, message: &str) {
        match kind {
            FeedbackKind::Success => info!(target: "gas_snooze::feedback", "{}", message),
            FeedbackKind::Error => error!(target: "gas_snooze::feedback", "{}", message),
        }
    }
}

/// Fans out to every configured sink
#[derive(Clone, Default)]
pub struct Feedback {
    sinks: Vec<Arc<dyn FeedbackSink>>,
}

impl Feedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl FeedbackSink for Feedback {
    fn notify(&self, kind: FeedbackKind, message: &str) {
        for sink in &self.sinks {
            sink.notify(kind, message);
        }
    }
}
