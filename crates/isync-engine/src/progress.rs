//! The Progress Bus: a single-producer-per-worker, single-consumer, lossy
//! event stream between workers and one observer.
//!
//! The producer side performs a non-blocking send (`try_send`): when the
//! bounded channel is full, the event is dropped rather than blocking the
//! worker. No per-event acknowledgment; the observer must tolerate gaps.

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use isync_core::Identifier;

/// Default bound on the number of buffered-but-unconsumed progress events.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Fetching,
    Serializing,
    Committing,
    Linking,
    Done,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub identifier: Identifier,
    pub stage: ProgressStage,
    pub processed_count: usize,
    pub total: usize,
    pub percentage: f64,
    pub worker_id: usize,
    pub ts: DateTime<Utc>,
}

/// Producer handle, cloned once per worker. `emit` never blocks.
#[derive(Clone)]
pub struct ProgressBus {
    sender: Sender<ProgressEvent>,
}

impl ProgressBus {
    /// Creates a bus and its single consumer-side receiver.
    pub fn new() -> (Self, ProgressReceiver) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, ProgressReceiver) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, ProgressReceiver { receiver })
    }

    /// Non-blocking send. Silently drops the event if the consumer hasn't
    /// kept up; never panics, never blocks the calling worker.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.try_send(event);
    }
}

/// Single-consumer side. The engine closes the bus exactly once at batch
/// end by dropping every `ProgressBus` clone it holds; the receiver then
/// observes the channel disconnect and its iterator ends.
pub struct ProgressReceiver {
    receiver: Receiver<ProgressEvent>,
}

impl ProgressReceiver {
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, ProgressEvent> {
        self.receiver.iter()
    }

    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isync_core::Identifier;

    fn event(identifier: &str, processed: usize, total: usize) -> ProgressEvent {
        ProgressEvent {
            identifier: Identifier::parse(identifier).unwrap(),
            stage: ProgressStage::Fetching,
            processed_count: processed,
            total,
            percentage: if total == 0 { 0.0 } else { processed as f64 / total as f64 * 100.0 },
            worker_id: 0,
            ts: Utc::now(),
        }
    }

    #[test]
    fn events_flow_from_producer_to_consumer() {
        let (bus, rx) = ProgressBus::new();
        bus.emit(event("A-1", 1, 2));
        bus.emit(event("A-2", 2, 2));
        drop(bus);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].identifier, Identifier::parse("A-1").unwrap());
    }

    #[test]
    fn full_channel_drops_rather_than_blocks() {
        let (bus, rx) = ProgressBus::with_capacity(1);
        bus.emit(event("A-1", 1, 3));
        bus.emit(event("A-2", 2, 3)); // dropped, channel full and nobody reading yet
        bus.emit(event("A-3", 3, 3)); // still dropped
        let first = rx.try_recv().unwrap();
        assert_eq!(first.identifier, Identifier::parse("A-1").unwrap());
        assert!(rx.try_recv().is_none());
    }
}
