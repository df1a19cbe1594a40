//! Cancellable one-shot timers.
//!
//! Both the scan deadline and the inter-round delay are a [`DelayedTask`]:
//! a tokio task that sleeps and then posts an [`Event`] into the central's
//! queue. The handle is kept so the task can be aborted before it fires.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::ble::radio::EventSink;
use crate::session::Event;

/// A pending delayed event.
#[derive(Debug)]
pub struct DelayedTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl DelayedTask {
    /// Post `event` to `sink` once `after` has elapsed.
    pub fn schedule(name: &'static str, after: Duration, sink: EventSink, event: Event) -> Self {
        trace!("Scheduling {} in {:?}", name, after);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            debug!("{} elapsed", name);
            sink.emit(event);
        });

        Self { name, handle }
    }

    /// Abort the task. Has no effect once it has fired.
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            debug!("Cancelling {}", self.name);
        }
        self.handle.abort();
    }

    /// Whether the task has neither fired nor been cancelled.
    pub fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Holds at most one [`DelayedTask`]; arming replaces and cancels the old one.
#[derive(Debug, Default)]
pub struct TimerSlot {
    task: Option<DelayedTask>,
}

impl TimerSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot, cancelling whatever was pending.
    pub fn arm(&mut self, name: &'static str, after: Duration, sink: EventSink, event: Event) {
        self.cancel();
        self.task = Some(DelayedTask::schedule(name, after, sink, event));
    }

    /// Cancel the pending task, if any.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }

    /// Whether a task is armed and has not fired.
    pub fn is_pending(&self) -> bool {
        self.task.as_ref().map(DelayedTask::is_pending).unwrap_or(false)
    }
}
