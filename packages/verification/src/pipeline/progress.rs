//! Progress broadcasting for one run.
//!
//! # Guarantees
//!
//! - **Non-decreasing percent**: an event never reports less progress than
//!   the one before it
//! - **At-most-once delivery**: events emitted with no subscriber are dropped,
//!   slow subscribers may lag and skip events
//! - **No replay**: late subscribers should read the run snapshot instead

use async_stream::stream;
use chrono::Utc;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::progress::{ProgressEvent, Stage};

const DEFAULT_CAPACITY: usize = 256;

/// Broadcasts [`ProgressEvent`]s for one check.
pub struct ProgressReporter {
    check_id: Uuid,
    sender: broadcast::Sender<ProgressEvent>,
    last_percent: AtomicU8,
}

impl ProgressReporter {
    pub fn new(check_id: Uuid) -> Self {
        Self::with_capacity(check_id, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(check_id: Uuid, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            check_id,
            sender,
            last_percent: AtomicU8::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Latest reported percent.
    pub fn percent(&self) -> u8 {
        self.last_percent.load(Ordering::SeqCst)
    }

    /// Emit an event at `percent`, raised to the last reported value if lower.
    ///
    /// Returns the event as sent.
    pub fn emit(&self, stage: Stage, percent: u8, message: impl Into<String>) -> ProgressEvent {
        let percent = percent.min(100);
        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);

        let event = ProgressEvent {
            check_id: self.check_id,
            stage,
            progress_percent: previous.max(percent),
            message: message.into(),
            timestamp: Utc::now(),
        };
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(
            check_id = %self.check_id,
            stage = %stage,
            percent = event.progress_percent,
            receivers = receivers,
            "Progress"
        );
        event
    }

    /// Emit the entry event for a stage at its base percent.
    pub fn enter(&self, stage: Stage, message: impl Into<String>) -> ProgressEvent {
        let percent = stage.base_percent().unwrap_or_else(|| self.percent());
        self.emit(stage, percent, message)
    }
}

/// Adapt a receiver into a stream that ends when the run's reporter is
/// dropped. Lagged events are skipped.
pub fn event_stream(
    mut receiver: broadcast::Receiver<ProgressEvent>,
) -> Pin<Box<dyn Stream<Item = ProgressEvent> + Send>> {
    Box::pin(stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => yield event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Progress subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
