//! Per-session conversation context. Transcript fragments arrive already
//! chunked by the transport; consecutive fragments from the same speaker are
//! merged into one logical turn here.

use crate::domain::{ConversationTurn, Speaker};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub learner_id: String,
    pub started_at: DateTime<Utc>,

    pub turn_count: u32,
    pub questions_attempted: u32,
    pub last_speaker: Option<Speaker>,
    pub last_user_text: Option<String>,
    pub last_tutor_text: Option<String>,
    pub last_user_turn_at: Option<DateTime<Utc>>,
    pub last_tutor_turn_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub last_retrieval_at: Option<DateTime<Utc>>,

    pub turns: Vec<ConversationTurn>,
    max_history: usize,

    /// Set on every mutation; the sync loop clears it after persisting.
    pub dirty: bool,
    /// Whether the inactivity skill already fired for the current quiet spell.
    pub inactivity_flagged: bool,
}

fn normalize(text: &str) -> String {
    let cleaned = text.replace("<noise>", " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl SessionContext {
    pub fn new(
        session_id: String,
        learner_id: String,
        started_at: DateTime<Utc>,
        max_history: usize,
    ) -> Self {
        Self {
            session_id,
            learner_id,
            started_at,
            turn_count: 0,
            questions_attempted: 0,
            last_speaker: None,
            last_user_text: None,
            last_tutor_text: None,
            last_user_turn_at: None,
            last_tutor_turn_at: None,
            last_activity_at: started_at,
            last_retrieval_at: None,
            turns: Vec::new(),
            max_history,
            dirty: false,
            inactivity_flagged: false,
        }
    }

    /// Add a transcript fragment. Empty (after normalization) fragments are
    /// dropped; an exact duplicate of the previous same-speaker fragment is
    /// dropped; a same-speaker continuation merges into the previous turn.
    pub fn add_turn(&mut self, speaker: Speaker, text: &str, timestamp: DateTime<Utc>) {
        let text = normalize(text);
        if text.is_empty() {
            return;
        }

        let effective_text = match self.turns.last_mut() {
            Some(last) if last.speaker == speaker => {
                if last.text == text {
                    return;
                }
                last.text = format!("{} {}", last.text, text);
                last.timestamp = timestamp;
                last.text.clone()
            }
            _ => {
                self.turns.push(ConversationTurn {
                    speaker,
                    text: text.clone(),
                    timestamp,
                });
                text
            }
        };

        if self.turns.len() > self.max_history {
            let excess = self.turns.len() - self.max_history;
            self.turns.drain(..excess);
        }

        match speaker {
            Speaker::User => {
                self.last_user_text = Some(effective_text);
                self.last_user_turn_at = Some(timestamp);
                self.turn_count += 1;
            }
            Speaker::Tutor | Speaker::Agent => {
                self.last_tutor_text = Some(effective_text);
                self.last_tutor_turn_at = Some(timestamp);
            }
        }
        self.last_speaker = Some(speaker);
        self.last_activity_at = timestamp;
        self.inactivity_flagged = false;
        self.dirty = true;
    }

    /// The last `count` turns rendered as "speaker: text" lines.
    pub fn recent_context(&self, count: usize) -> String {
        let start = self.turns.len().saturating_sub(count);
        self.turns[start..]
            .iter()
            .map(|t| format!("{}: {}", t.speaker.as_str(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The last `count` turns joined into one text blob (deep query input).
    pub fn recent_text(&self, count: usize) -> String {
        let start = self.turns.len().saturating_sub(count);
        self.turns[start..]
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn seconds_since_activity(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_activity_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn seconds_since_start(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
