//! In-memory per-session state. One lock per session guards the context, the
//! retrieval caches, the injected-id window, and the closing cache, so there
//! is no lock ordering to get wrong. The registry caps resident sessions
//! with least-recently-used eviction.

use crate::domain::{MemoryCategory, ScoredMemory};
use crate::memory::consolidator::ClosingState;
use crate::runtime::context::SessionContext;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Light and deep retrieval results awaiting synthesis, plus the deep timer.
#[derive(Debug, Clone, Default)]
pub struct RetrievalCaches {
    pub light: Vec<ScoredMemory>,
    pub deep: HashMap<MemoryCategory, Vec<ScoredMemory>>,
    pub last_deep_at: Option<DateTime<Utc>>,
}

impl RetrievalCaches {
    pub fn clear(&mut self) {
        self.light.clear();
        self.deep.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.light.is_empty() && self.deep.values().all(|v| v.is_empty())
    }
}

/// Bounded first-in-first-out set of injected memory ids.
#[derive(Debug, Default)]
pub struct InjectedWindow {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl InjectedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Record an id, evicting the oldest once past capacity. Returns false if
    /// the id was already present.
    pub fn insert(&mut self, id: String) -> bool {
        if !self.members.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Everything mutable about a live session, behind one lock.
pub struct SessionState {
    pub context: SessionContext,
    pub caches: RetrievalCaches,
    pub injected: InjectedWindow,
    pub closing: ClosingState,
}

pub type SessionHandle = Arc<Mutex<SessionState>>;

struct SessionEntry {
    state: SessionHandle,
    /// Serializes exchange-buffer flushes against batch extraction.
    extraction: Arc<Mutex<()>>,
    last_access: Instant,
}

/// Registry of resident sessions with an LRU cap.
pub struct SessionRegistry {
    entries: StdMutex<HashMap<String, SessionEntry>>,
    max_sessions: usize,
    max_history: usize,
    max_injected_ids: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, max_history: usize, max_injected_ids: usize) -> Self {
        Self {
            entries: StdMutex::new(HashMap::new()),
            max_sessions,
            max_history,
            max_injected_ids,
        }
    }

    pub fn create(
        &self,
        session_id: &str,
        learner_id: &str,
        started_at: DateTime<Utc>,
    ) -> SessionHandle {
        let mut entries = self.entries.lock().expect("session registry poisoned");

        if entries.len() >= self.max_sessions && !entries.contains_key(session_id) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(id, _)| id.clone())
            {
                tracing::info!(session_id = %oldest, "evicting least-recently-used session state");
                entries.remove(&oldest);
            }
        }

        let state = Arc::new(Mutex::new(SessionState {
            context: SessionContext::new(
                session_id.to_string(),
                learner_id.to_string(),
                started_at,
                self.max_history,
            ),
            caches: RetrievalCaches::default(),
            injected: InjectedWindow::new(self.max_injected_ids),
            closing: ClosingState::default(),
        }));

        entries.insert(
            session_id.to_string(),
            SessionEntry {
                state: Arc::clone(&state),
                extraction: Arc::new(Mutex::new(())),
                last_access: Instant::now(),
            },
        );
        state
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        let mut entries = self.entries.lock().expect("session registry poisoned");
        entries.get_mut(session_id).map(|entry| {
            entry.last_access = Instant::now();
            Arc::clone(&entry.state)
        })
    }

    /// The per-session extraction mutex (flush vs batch mutual exclusion).
    pub fn extraction_lock(&self, session_id: &str) -> Option<Arc<Mutex<()>>> {
        let entries = self.entries.lock().expect("session registry poisoned");
        entries.get(session_id).map(|e| Arc::clone(&e.extraction))
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let mut entries = self.entries.lock().expect("session registry poisoned");
        entries.remove(session_id).map(|e| e.state)
    }

    pub fn session_ids(&self) -> Vec<String> {
        let entries = self.entries.lock().expect("session registry poisoned");
        entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("session registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
