//! Bounded priority queue for session events. Ordering key is
//! (priority, timestamp, monotonic counter) so equal-priority events drain in
//! arrival order deterministically.

use crate::domain::SessionEvent;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tokio::sync::Notify;

struct QueuedEvent {
    priority: u8,
    timestamp_ms: i64,
    seq: u64,
    event: SessionEvent,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.timestamp_ms, self.seq).cmp(&(
            other.priority,
            other.timestamp_ms,
            other.seq,
        ))
    }
}

pub struct EventQueue {
    heap: Mutex<BinaryHeap<Reverse<QueuedEvent>>>,
    capacity: usize,
    seq: AtomicU64,
    notify: Notify,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            capacity,
            seq: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Enqueue an event. Returns false (dropping the event) when full.
    pub fn enqueue(&self, event: SessionEvent) -> bool {
        let queued = QueuedEvent {
            priority: event.kind.priority(),
            timestamp_ms: event.timestamp.timestamp_millis(),
            seq: self.seq.fetch_add(1, AtomicOrdering::SeqCst),
            event,
        };

        let mut heap = self.heap.lock().expect("event queue poisoned");
        if heap.len() >= self.capacity {
            tracing::warn!(capacity = self.capacity, "event queue full, dropping event");
            return false;
        }
        heap.push(Reverse(queued));
        drop(heap);
        self.notify.notify_one();
        true
    }

    /// Drain up to `max_batch_size` events in priority order.
    pub fn dequeue_batch(&self, max_batch_size: usize) -> Vec<SessionEvent> {
        let mut heap = self.heap.lock().expect("event queue poisoned");
        let mut events = Vec::new();
        while events.len() < max_batch_size {
            match heap.pop() {
                Some(Reverse(queued)) => events.push(queued.event),
                None => break,
            }
        }
        events
    }

    pub fn len(&self) -> usize {
        self.heap.lock().expect("event queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until an enqueue notification arrives.
    pub async fn wait_for_event(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, Speaker};
    use chrono::{Duration, Utc};

    fn text_event(text: &str, ts: chrono::DateTime<Utc>) -> SessionEvent {
        SessionEvent::text("session-1", "learner-1", Speaker::User, text, ts)
    }

    fn lifecycle(kind: EventKind, ts: chrono::DateTime<Utc>) -> SessionEvent {
        SessionEvent {
            kind,
            timestamp: ts,
            session_id: "session-1".to_string(),
            learner_id: "learner-1".to_string(),
        }
    }

    #[test]
    fn lifecycle_events_dequeue_before_text() {
        let queue = EventQueue::new(16);
        let now = Utc::now();
        queue.enqueue(text_event("hello", now));
        queue.enqueue(lifecycle(EventKind::SessionEnd, now + Duration::seconds(1)));

        let batch = queue.dequeue_batch(10);
        assert!(matches!(batch[0].kind, EventKind::SessionEnd));
        assert!(matches!(batch[1].kind, EventKind::Text { .. }));
    }

    #[test]
    fn equal_priority_preserves_timestamp_then_arrival_order() {
        let queue = EventQueue::new(16);
        let now = Utc::now();
        queue.enqueue(text_event("later", now + Duration::seconds(5)));
        queue.enqueue(text_event("first", now));
        queue.enqueue(text_event("second", now));

        let texts: Vec<String> = queue
            .dequeue_batch(10)
            .into_iter()
            .map(|e| match e.kind {
                EventKind::Text { text, .. } => text,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["first", "second", "later"]);
    }

    #[test]
    fn batch_size_is_respected() {
        let queue = EventQueue::new(16);
        let now = Utc::now();
        for i in 0..7 {
            queue.enqueue(text_event(&format!("t{i}"), now));
        }
        assert_eq!(queue.dequeue_batch(5).len(), 5);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn full_queue_drops_new_events() {
        let queue = EventQueue::new(2);
        let now = Utc::now();
        assert!(queue.enqueue(text_event("a", now)));
        assert!(queue.enqueue(text_event("b", now)));
        assert!(!queue.enqueue(text_event("c", now)));
        assert_eq!(queue.len(), 2);
    }
}
