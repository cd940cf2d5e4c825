//! Pluggable per-session skills evaluated by the pipeline on every pass over
//! active sessions. A skill inspects the context and may emit one instruction.

use crate::runtime::context::SessionContext;
use chrono::{DateTime, Utc};

pub trait SessionSkill: Send + Sync {
    fn name(&self) -> &str;

    fn should_run(&self, context: &SessionContext, now: DateTime<Utc>) -> bool;

    /// Run the skill. May mutate per-session flags on the context. Returns an
    /// instruction to inject, or None.
    fn execute(&self, context: &mut SessionContext, now: DateTime<Utc>) -> Option<String>;
}

#[derive(Default)]
pub struct SkillSet {
    skills: Vec<Box<dyn SessionSkill>>,
}

impl SkillSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: Box<dyn SessionSkill>) {
        tracing::info!(skill = skill.name(), "registered session skill");
        self.skills.push(skill);
    }

    /// Evaluate every skill against the context. A failing skill must not
    /// block the others, so each result is collected independently.
    pub fn execute_all(&self, context: &mut SessionContext, now: DateTime<Utc>) -> Vec<String> {
        let mut injections = Vec::new();
        for skill in &self.skills {
            if skill.should_run(context, now) {
                if let Some(instruction) = skill.execute(context, now) {
                    injections.push(instruction);
                }
            }
        }
        injections
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

/// Prompts the agent to check in when the learner has gone quiet. Fires once
/// per quiet spell; activity re-arms it. A grace period after session start
/// avoids prompting before the conversation begins.
pub struct InactivityCheck {
    threshold_seconds: f64,
    grace_seconds: f64,
}

impl InactivityCheck {
    pub fn new(threshold_seconds: f64, grace_seconds: f64) -> Self {
        Self {
            threshold_seconds,
            grace_seconds,
        }
    }
}

impl SessionSkill for InactivityCheck {
    fn name(&self) -> &str {
        "inactivity_check"
    }

    fn should_run(&self, context: &SessionContext, now: DateTime<Utc>) -> bool {
        !context.inactivity_flagged
            && context.seconds_since_start(now) > self.grace_seconds
            && context.seconds_since_activity(now) > self.threshold_seconds
    }

    fn execute(&self, context: &mut SessionContext, _now: DateTime<Utc>) -> Option<String> {
        context.inactivity_flagged = true;
        tracing::info!(session_id = %context.session_id, "inactivity detected, prompting check-in");
        Some(
            "Check with the student if they're still there, and whether they want to \
             continue. We have some interesting problems left to solve."
                .to_string(),
        )
    }
}
