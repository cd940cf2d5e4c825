use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a transcript fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Tutor,
    Agent,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Tutor => "tutor",
            Speaker::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "user" => Ok(Speaker::User),
            "tutor" => Ok(Speaker::Tutor),
            "agent" => Ok(Speaker::Agent),
            _ => Err(format!("Unknown speaker: {}", s)),
        }
    }

    /// Whether this speaker is the conversational agent side of the dialog.
    pub fn is_agent_side(&self) -> bool {
        matches!(self, Speaker::Tutor | Speaker::Agent)
    }
}

/// Event payloads recognized by the pipeline. Audio and video are reserved
/// placeholders; they carry no data yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    Text {
        speaker: Speaker,
        text: String,
        #[serde(default)]
        topic: Option<String>,
    },
    Audio,
    Video,
}

impl EventKind {
    /// Queue priority: lifecycle events first, then text, then media.
    pub fn priority(&self) -> u8 {
        match self {
            EventKind::SessionStart | EventKind::SessionEnd => 1,
            EventKind::Text { .. } => 2,
            EventKind::Audio => 3,
            EventKind::Video => 4,
        }
    }
}

/// A single event flowing through the session pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub learner_id: String,
}

impl SessionEvent {
    pub fn text(
        session_id: impl Into<String>,
        learner_id: impl Into<String>,
        speaker: Speaker,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::Text {
                speaker,
                text: text.into(),
                topic: None,
            },
            timestamp,
            session_id: session_id.into(),
            learner_id: learner_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_events_outrank_text_and_media() {
        let start = EventKind::SessionStart.priority();
        let text = EventKind::Text {
            speaker: Speaker::User,
            text: "hi".into(),
            topic: None,
        }
        .priority();
        assert!(start < text);
        assert!(text < EventKind::Audio.priority());
        assert!(EventKind::Audio.priority() < EventKind::Video.priority());
    }

    #[test]
    fn speaker_parse_rejects_unknown() {
        assert_eq!(Speaker::parse("user").unwrap(), Speaker::User);
        assert!(Speaker::parse("narrator").is_err());
    }
}
