//! Progress reporting for dispatch runs.
//!
//! Workers never wait on a sink: events go through a bounded channel with
//! `try_send`, and a reporter thread drains it into the sink. Events that do
//! not fit are dropped and counted.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

/// Lifecycle step of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Started,
    Retrying,
    Completed,
    Failed,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Informational event about one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub chunk_index: usize,
    pub status: ProgressStatus,
    /// Attempt number this event refers to (1-based).
    pub attempt: u32,
    /// Chunks with a terminal outcome when the event was emitted.
    pub completed: usize,
    pub total: usize,
    pub timestamp: SystemTime,
}

impl ProgressEvent {
    pub fn new(
        chunk_index: usize,
        status: ProgressStatus,
        attempt: u32,
        completed: usize,
        total: usize,
    ) -> Self {
        Self {
            chunk_index,
            status,
            attempt,
            completed,
            total,
            timestamp: SystemTime::now(),
        }
    }

    /// Whether this event marks the end of a chunk.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ProgressStatus::Completed | ProgressStatus::Failed)
    }
}

/// Consumer of progress events.
///
/// Runs on the reporter thread, so implementations may block without
/// slowing down synthesis.
pub trait ProgressSink: Send + 'static {
    /// Handle one event.
    fn handle(&mut self, event: &ProgressEvent);

    /// Called once after the last event.
    fn finish(&mut self) {}
}

enum Message {
    Event(ProgressEvent),
    Shutdown,
}

/// Cloneable, non-blocking handle used by workers to publish events.
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: Sender<Message>,
    dropped: Arc<AtomicU64>,
}

impl ProgressEmitter {
    /// Publish an event; drops it if the channel is full or closed.
    pub fn emit(&self, event: ProgressEvent) {
        match self.tx.try_send(Message::Event(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Owns the reporter thread and the sink running on it.
pub struct ProgressReporter {
    emitter: ProgressEmitter,
    thread: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Start a reporter thread draining a channel of `capacity` events.
    pub fn spawn(sink: Box<dyn ProgressSink>, capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = bounded(capacity.max(1));
        let thread = thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || drain(sink, rx))?;

        Ok(Self {
            emitter: ProgressEmitter {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            thread: Some(thread),
        })
    }

    /// Handle for publishing events from workers.
    pub fn emitter(&self) -> ProgressEmitter {
        self.emitter.clone()
    }

    /// Stop the reporter thread and return the number of dropped events.
    ///
    /// Events already queued are delivered before the sink's `finish` runs.
    pub fn finish(mut self) -> u64 {
        self.shutdown();
        self.emitter.dropped()
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Blocking send: the queue ahead of it is still being drained.
        if self.emitter.tx.send(Message::Shutdown).is_err() {
            tracing::debug!("progress reporter already stopped");
        }
        if thread.join().is_err() {
            tracing::warn!("progress sink panicked");
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drain(mut sink: Box<dyn ProgressSink>, rx: Receiver<Message>) {
    while let Ok(message) = rx.recv() {
        match message {
            Message::Event(event) => sink.handle(&event),
            Message::Shutdown => break,
        }
    }
    sink.finish();
}

/// Sink that writes events to the `tracing` log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn handle(&mut self, event: &ProgressEvent) {
        match event.status {
            ProgressStatus::Started | ProgressStatus::Completed => tracing::debug!(
                chunk = event.chunk_index,
                attempt = event.attempt,
                "{} ({}/{})",
                event.status,
                event.completed,
                event.total
            ),
            ProgressStatus::Retrying | ProgressStatus::Failed => tracing::warn!(
                chunk = event.chunk_index,
                attempt = event.attempt,
                "{} ({}/{})",
                event.status,
                event.completed,
                event.total
            ),
        }
    }
}

/// Sink that stores every event in a shared list.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
    finished: Arc<AtomicU64>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst) > 0
    }
}

impl ProgressSink for CollectorSink {
    fn handle(&mut self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }

    fn finish(&mut self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn event(index: usize, status: ProgressStatus) -> ProgressEvent {
        ProgressEvent::new(index, status, 1, 0, 4)
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ProgressStatus::Started.to_string(), "started");
        assert_eq!(ProgressStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!event(0, ProgressStatus::Started).is_terminal());
        assert!(!event(0, ProgressStatus::Retrying).is_terminal());
        assert!(event(0, ProgressStatus::Completed).is_terminal());
        assert!(event(0, ProgressStatus::Failed).is_terminal());
    }

    #[test]
    fn test_reporter_delivers_events_in_order() {
        let collector = CollectorSink::new();
        let reporter = ProgressReporter::spawn(Box::new(collector.clone()), 16).unwrap();
        let emitter = reporter.emitter();

        emitter.emit(event(0, ProgressStatus::Started));
        emitter.emit(event(0, ProgressStatus::Completed));
        emitter.emit(event(1, ProgressStatus::Started));

        let dropped = reporter.finish();
        assert_eq!(dropped, 0);
        assert!(collector.is_finished());

        let statuses: Vec<_> = collector
            .events()
            .iter()
            .map(|e| (e.chunk_index, e.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (0, ProgressStatus::Started),
                (0, ProgressStatus::Completed),
                (1, ProgressStatus::Started),
            ]
        );
    }

    /// Sink that blocks until the test lets it go.
    struct GatedSink {
        gate: mpsc::Receiver<()>,
        seen: Arc<AtomicU64>,
    }

    impl ProgressSink for GatedSink {
        fn handle(&mut self, _event: &ProgressEvent) {
            let _ = self.gate.recv_timeout(Duration::from_secs(5));
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let seen = Arc::new(AtomicU64::new(0));
        let sink = GatedSink {
            gate: gate_rx,
            seen: seen.clone(),
        };
        let reporter = ProgressReporter::spawn(Box::new(sink), 2).unwrap();
        let emitter = reporter.emitter();

        // One event may be held by the blocked sink, two fit in the
        // channel; the rest must be dropped without blocking.
        for i in 0..20 {
            emitter.emit(event(i, ProgressStatus::Started));
        }
        assert!(emitter.dropped() >= 17);

        for _ in 0..20 {
            let _ = gate_tx.send(());
        }
        let dropped = reporter.finish();
        assert_eq!(dropped + seen.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_emit_after_finish_is_counted_as_dropped() {
        let reporter = ProgressReporter::spawn(Box::new(LogSink), 4).unwrap();
        let emitter = reporter.emitter();
        reporter.finish();

        emitter.emit(event(0, ProgressStatus::Started));
        // The receiver is gone once the thread exits, so the event is lost.
        assert_eq!(emitter.dropped(), 1);
    }

    #[test]
    fn test_drop_stops_reporter_thread() {
        let collector = CollectorSink::new();
        {
            let reporter = ProgressReporter::spawn(Box::new(collector.clone()), 4).unwrap();
            reporter.emitter().emit(event(0, ProgressStatus::Completed));
        }
        assert!(collector.is_finished());
        assert_eq!(collector.events().len(), 1);
    }
}
