use crossbeam::channel::{Receiver, Sender};

use hivelog_core::{MiteCount, ReportKey};

use crate::batch::{BatchSummary, PendingConflict};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A report was created or overwritten; views showing that hive should refresh.
    ReportWritten { key: ReportKey, count: MiteCount },
    ConflictDetected(PendingConflict),
    /// Emitted exactly once per finished batch.
    BatchCompleted(BatchSummary),
    BatchCancelled,
}

/// Publish/subscribe channel scoped to one reporting session. Dropped with it.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<SessionEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (sender, receiver) = crossbeam::channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Subscribers whose receiver has been dropped are pruned here.
    pub fn publish(&mut self, event: SessionEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_the_event() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(SessionEvent::BatchCancelled);
        assert_eq!(a.try_recv().unwrap(), SessionEvent::BatchCancelled);
        assert_eq!(b.try_recv().unwrap(), SessionEvent::BatchCancelled);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(SessionEvent::BatchCancelled);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
