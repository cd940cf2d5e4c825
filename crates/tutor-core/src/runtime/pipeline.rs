//! The cooperative event loop: drain the priority queue in small batches,
//! hand events to the assistant, and run time-based skills on every resident
//! session while idle.

use crate::domain::SessionEvent;
use crate::runtime::assistant::TeachingAssistant;
use crate::runtime::queue::EventQueue;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const IDLE_WAIT: Duration = Duration::from_millis(250);

pub struct EventPipeline {
    assistant: Arc<TeachingAssistant>,
    queue: Arc<EventQueue>,
    batch_size: usize,
    running: AtomicBool,
}

impl EventPipeline {
    pub fn new(assistant: Arc<TeachingAssistant>, queue: Arc<EventQueue>, batch_size: usize) -> Self {
        Self {
            assistant,
            queue,
            batch_size: batch_size.max(1),
            running: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Enqueue an event for processing. Returns false when the queue is full.
    pub fn enqueue(&self, event: SessionEvent) -> bool {
        self.queue.enqueue(event)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until `shutdown`. Every event is handled with its errors contained;
    /// idle iterations run the skill pass so inactivity checks fire without
    /// transcript traffic.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(batch_size = self.batch_size, "event pipeline running");

        while self.running.load(Ordering::SeqCst) {
            let events = self.queue.dequeue_batch(self.batch_size);
            if events.is_empty() {
                self.assistant.run_idle_pass(Utc::now()).await;
                tokio::select! {
                    _ = self.queue.wait_for_event() => {}
                    _ = tokio::time::sleep(IDLE_WAIT) => {}
                }
                continue;
            }

            for event in events {
                self.assistant.handle_event(event).await;
            }
        }
        tracing::info!("event pipeline stopped");
    }

    /// Drain and handle everything currently queued, without idling. Test and
    /// CLI hook for deterministic processing.
    pub async fn drain(&self) {
        loop {
            let events = self.queue.dequeue_batch(self.batch_size);
            if events.is_empty() {
                break;
            }
            for event in events {
                self.assistant.handle_event(event).await;
            }
        }
    }
}
