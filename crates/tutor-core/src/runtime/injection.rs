//! Per-session instruction queues. Enqueue order is preserved and every
//! instruction is delivered at most once. Back-to-back duplicates for the
//! same session are suppressed at enqueue time.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct QueuedInstruction {
    pub id: String,
    pub session_id: String,
    pub text: String,
    pub queued_at: DateTime<Utc>,
}

pub struct InjectionManager {
    queues: Mutex<HashMap<String, VecDeque<QueuedInstruction>>>,
    /// The last instruction text enqueued per session (for dedup).
    last_enqueued: Mutex<HashMap<String, String>>,
    notify: Notify,
    instruction_prefix: String,
}

impl InjectionManager {
    pub fn new(instruction_prefix: impl Into<String>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            last_enqueued: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            instruction_prefix: instruction_prefix.into(),
        }
    }

    /// Queue an instruction for the external agent. Returns the instruction
    /// id, or None when dropped as a back-to-back duplicate.
    pub fn push(&self, session_id: &str, message: &str) -> Option<String> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return None;
        }

        {
            let mut last = self.last_enqueued.lock().expect("injection state poisoned");
            match last.get(session_id) {
                Some(previous) if previous == trimmed => {
                    tracing::debug!(session_id, "suppressing duplicate instruction");
                    return None;
                }
                _ => {
                    last.insert(session_id.to_string(), trimmed.to_string());
                }
            }
        }

        let text = if trimmed.starts_with(&self.instruction_prefix) {
            trimmed.to_string()
        } else {
            format!("{}\n{}", self.instruction_prefix, trimmed)
        };

        let instruction = QueuedInstruction {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            text,
            queued_at: Utc::now(),
        };
        let id = instruction.id.clone();

        let mut queues = self.queues.lock().expect("injection state poisoned");
        queues
            .entry(session_id.to_string())
            .or_default()
            .push_back(instruction);
        drop(queues);
        self.notify.notify_waiters();

        tracing::info!(session_id, instruction_id = %id, "queued instruction");
        Some(id)
    }

    /// Queue a message verbatim, without the instruction prefix. Used for
    /// greeting/closing prompts that carry their own framing.
    pub fn push_raw(&self, session_id: &str, message: &str) -> Option<String> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.last_enqueued
            .lock()
            .expect("injection state poisoned")
            .insert(session_id.to_string(), trimmed.to_string());

        let instruction = QueuedInstruction {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            text: trimmed.to_string(),
            queued_at: Utc::now(),
        };
        let id = instruction.id.clone();

        let mut queues = self.queues.lock().expect("injection state poisoned");
        queues
            .entry(session_id.to_string())
            .or_default()
            .push_back(instruction);
        drop(queues);
        self.notify.notify_waiters();
        Some(id)
    }

    /// Take the oldest pending instruction, removing it from the queue.
    pub fn pop(&self, session_id: &str) -> Option<QueuedInstruction> {
        let mut queues = self.queues.lock().expect("injection state poisoned");
        queues.get_mut(session_id).and_then(|q| q.pop_front())
    }

    /// Wait for the next instruction for a session (FIFO, at-most-once).
    pub async fn next_instruction(&self, session_id: &str) -> QueuedInstruction {
        loop {
            // Register for notification before checking the queue so a push
            // between the check and the await is never lost.
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if let Some(instruction) = self.pop(session_id) {
                return instruction;
            }
            notified.await;
        }
    }

    pub fn pending(&self, session_id: &str) -> usize {
        let queues = self.queues.lock().expect("injection state poisoned");
        queues.get(session_id).map(|q| q.len()).unwrap_or(0)
    }

    /// Drop all state for an ended session.
    pub fn clear_session(&self, session_id: &str) {
        self.queues
            .lock()
            .expect("injection state poisoned")
            .remove(session_id);
        self.last_enqueued
            .lock()
            .expect("injection state poisoned")
            .remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> InjectionManager {
        InjectionManager::new("[SYSTEM INSTRUCTION]")
    }

    #[test]
    fn delivery_is_fifo_and_at_most_once() {
        let manager = manager();
        manager.push("s1", "first");
        manager.push("s1", "second");

        let a = manager.pop("s1").unwrap();
        let b = manager.pop("s1").unwrap();
        assert!(a.text.contains("first"));
        assert!(b.text.contains("second"));
        assert!(manager.pop("s1").is_none());
    }

    #[test]
    fn prefix_is_added_once() {
        let manager = manager();
        manager.push("s1", "do the thing");
        let got = manager.pop("s1").unwrap();
        assert!(got.text.starts_with("[SYSTEM INSTRUCTION]\n"));

        manager.push("s1", "[SYSTEM INSTRUCTION]\nalready prefixed");
        let got = manager.pop("s1").unwrap();
        assert_eq!(got.text.matches("[SYSTEM INSTRUCTION]").count(), 1);
    }

    #[test]
    fn back_to_back_duplicates_are_suppressed() {
        let manager = manager();
        assert!(manager.push("s1", "repeat me").is_some());
        assert!(manager.push("s1", "repeat me").is_none());
        assert!(manager.push("s1", "different").is_some());
        assert!(manager.push("s1", "repeat me").is_some());
        assert_eq!(manager.pending("s1"), 3);
    }

    #[test]
    fn sessions_are_isolated() {
        let manager = manager();
        manager.push("s1", "for one");
        manager.push("s2", "for two");
        assert_eq!(manager.pending("s1"), 1);
        assert_eq!(manager.pending("s2"), 1);
        manager.clear_session("s1");
        assert_eq!(manager.pending("s1"), 0);
        assert_eq!(manager.pending("s2"), 1);
    }

    #[tokio::test]
    async fn next_instruction_wakes_on_push() {
        let manager = std::sync::Arc::new(manager());
        let waiter = std::sync::Arc::clone(&manager);
        let handle = tokio::spawn(async move { waiter.next_instruction("s1").await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        manager.push("s1", "wake up");

        let got = handle.await.unwrap();
        assert!(got.text.contains("wake up"));
    }
}
