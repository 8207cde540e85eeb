//! Progress sink port (driven/secondary port)
//!
//! The visual surface that receives structured progress events. Delivery
//! is fire-and-forget; a missing or lagging subscriber must never slow a
//! transfer down.

use crate::domain::ProgressEvent;

/// Port trait receiving progress events
pub trait IProgressSink: Send + Sync {
    /// Publishes an event; implementations drop it if nobody listens
    fn emit(&self, event: ProgressEvent);
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl IProgressSink for NullProgressSink {
    fn emit(&self, _event: ProgressEvent) {}
}
