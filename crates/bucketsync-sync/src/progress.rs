//! Broadcast progress stream
//!
//! [`ProgressReporter`] is the [`IProgressSink`] handed to the engine and
//! the transfer executor. Subscribers get a `broadcast::Receiver`; events
//! published with nobody listening are dropped, and a slow subscriber
//! lags instead of blocking transfers.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::broadcast;

use bucketsync_core::{
    domain::{ProgressEvent, ProgressKind},
    ports::IProgressSink,
};
use bucketsync_storage::ProgressFn;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out progress publisher
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns a receiver for events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl IProgressSink for ProgressReporter {
    fn emit(&self, event: ProgressEvent) {
        // An error only means nobody is subscribed.
        let _ = self.tx.send(event);
    }
}

/// Builds a byte-progress callback that emits one event per whole percent
///
/// `kind` selects between download and upload events; any other kind is
/// reported as an upload.
pub fn transfer_progress(
    sink: Arc<dyn IProgressSink>,
    kind: ProgressKind,
    filename: impl Into<String>,
) -> ProgressFn {
    let filename = filename.into();
    let last_percent = AtomicU64::new(u64::MAX);

    Arc::new(move |done: u64, total: u64| {
        let percent = if total == 0 {
            100.0
        } else {
            (done as f64 * 100.0 / total as f64).min(100.0)
        };
        let whole = percent.floor() as u64;
        if last_percent.swap(whole, Ordering::Relaxed) == whole {
            return;
        }
        let event = match kind {
            ProgressKind::Download => ProgressEvent::download(filename.clone(), percent, done),
            _ => ProgressEvent::upload(filename.clone(), percent, done),
        };
        sink.emit(event);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let reporter = ProgressReporter::default();
        let mut rx = reporter.subscribe();

        reporter.emit(ProgressEvent::info("Sync started"));
        reporter.emit(ProgressEvent::complete(2, 1));

        assert_eq!(rx.recv().await.unwrap(), ProgressEvent::info("Sync started"));
        let complete = rx.recv().await.unwrap();
        assert_eq!(complete.kind, ProgressKind::Complete);
        assert_eq!(complete.download_count, Some(2));
        assert_eq!(complete.upload_count, Some(1));
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let reporter = ProgressReporter::new(4);
        assert_eq!(reporter.subscriber_count(), 0);
        reporter.emit(ProgressEvent::error("nobody listens"));
    }

    #[tokio::test]
    async fn test_transfer_progress_emits_once_per_percent() {
        let reporter = ProgressReporter::default();
        let mut rx = reporter.subscribe();
        let callback = transfer_progress(Arc::new(reporter.clone()), ProgressKind::Download, "a.txt");

        callback(0, 200);
        callback(1, 200);
        callback(100, 200);
        callback(200, 200);

        let percents: Vec<f64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| {
                assert_eq!(event.kind, ProgressKind::Download);
                assert_eq!(event.filename.as_deref(), Some("a.txt"));
                event.percent.unwrap()
            })
            .collect();
        assert_eq!(percents, vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn test_empty_transfer_reports_complete() {
        let reporter = ProgressReporter::default();
        let mut rx = reporter.subscribe();
        let callback = transfer_progress(Arc::new(reporter.clone()), ProgressKind::Upload, "empty");

        callback(0, 0);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ProgressKind::Upload);
        assert_eq!(event.percent, Some(100.0));
    }
}
