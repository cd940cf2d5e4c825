use crate::config::DashConfig;
use crate::domain::{QuestionAttempt, SkillState};
use crate::graph::SkillGraph;
use crate::ports::LearnerStateRepository;
use crate::question_index::QuestionIndex;
use crate::scheduler::{
    correct_increment, decayed_strength, time_penalty, STRENGTH_MAX, STRENGTH_MIN,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Handles attempt recording: strength updates for the practiced skills,
/// penalty propagation to transitive prerequisites on wrong answers, and the
/// single atomic persistence write.
pub struct LearningService {
    graph: Arc<SkillGraph>,
    questions: Arc<QuestionIndex>,
    repo: Arc<dyn LearnerStateRepository>,
    config: DashConfig,
}

impl LearningService {
    pub fn new(
        graph: Arc<SkillGraph>,
        questions: Arc<QuestionIndex>,
        repo: Arc<dyn LearnerStateRepository>,
        config: DashConfig,
    ) -> Self {
        Self {
            graph,
            questions,
            repo,
            config,
        }
    }

    /// Record one attempt at the current time. Returns the affected skill
    /// ids (practiced skills first, then penalized prerequisites),
    /// deduplicated preserving first-seen order.
    pub async fn record_attempt(
        &self,
        learner_id: &str,
        question_id: &str,
        skill_ids: &[String],
        is_correct: bool,
        response_time_seconds: f64,
    ) -> Result<Vec<String>> {
        self.record_attempt_at(
            learner_id,
            question_id,
            skill_ids,
            is_correct,
            response_time_seconds,
            Utc::now(),
        )
        .await
    }

    /// Record one attempt at an explicit time.
    pub async fn record_attempt_at(
        &self,
        learner_id: &str,
        question_id: &str,
        skill_ids: &[String],
        is_correct: bool,
        response_time_seconds: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let penalty = time_penalty(response_time_seconds, self.config.time_penalty_seconds);
        let question = self.questions.get(question_id);
        let expected = question.map(|q| q.expected_time_seconds).unwrap_or(0.0);
        let time_ratio = if expected > 0.0 {
            response_time_seconds / expected
        } else {
            0.0
        };
        tracing::info!(
            learner_id,
            question_id,
            is_correct,
            skills = ?skill_ids,
            response_time_seconds,
            expected_time_seconds = expected,
            time_ratio,
            time_penalty_applied = penalty < 1.0,
            "recording question attempt"
        );

        let mut affected: Vec<String> = Vec::new();
        let mut primary_states: Vec<SkillState> = Vec::new();
        let mut prerequisite_states: Vec<SkillState> = Vec::new();

        for skill_id in skill_ids {
            let state = self
                .update_practiced_skill(learner_id, skill_id, is_correct, penalty, now)
                .await?;
            if !affected.contains(skill_id) {
                affected.push(skill_id.clone());
            }
            primary_states.push(state);

            if !is_correct {
                for prereq_id in self.graph.prerequisites(skill_id) {
                    if affected.contains(&prereq_id) {
                        continue;
                    }
                    let state = self.penalize_prerequisite(learner_id, &prereq_id, now).await?;
                    affected.push(prereq_id);
                    prerequisite_states.push(state);
                }
            }
        }

        let attempt = QuestionAttempt {
            learner_id: learner_id.to_string(),
            question_id: question_id.to_string(),
            skill_ids: skill_ids.to_vec(),
            is_correct,
            response_time_seconds,
            attempted_at: now,
        };

        self.repo
            .save_attempt_atomic(&attempt, primary_states, prerequisite_states)
            .await?;

        tracing::info!(learner_id, affected = ?affected, "attempt recorded");
        Ok(affected)
    }

    async fn load_or_default(&self, learner_id: &str, skill_id: &str) -> Result<SkillState> {
        Ok(self
            .repo
            .get_skill_state(learner_id, skill_id)
            .await?
            .unwrap_or_else(|| {
                SkillState::new_for_skill(learner_id.to_string(), skill_id.to_string())
            }))
    }

    async fn update_practiced_skill(
        &self,
        learner_id: &str,
        skill_id: &str,
        is_correct: bool,
        penalty: f64,
        now: DateTime<Utc>,
    ) -> Result<SkillState> {
        let mut state = self.load_or_default(learner_id, skill_id).await?;
        let forgetting_rate = self
            .graph
            .get(skill_id)
            .map(|s| s.forgetting_rate)
            .unwrap_or(0.1);

        let current = decayed_strength(
            state.memory_strength,
            state.last_practice_time,
            forgetting_rate,
            now,
        );
        let previous = state.memory_strength;

        let new_strength = if is_correct {
            let increment = correct_increment(state.correct_count) * penalty;
            (current + increment).min(STRENGTH_MAX)
        } else {
            (current - 0.2).max(STRENGTH_MIN)
        };

        state.practice_count += 1;
        if is_correct {
            state.correct_count += 1;
        }
        state.memory_strength = new_strength;
        state.last_practice_time = Some(now);

        tracing::info!(
            learner_id,
            skill_id,
            is_correct,
            previous_strength = previous,
            decayed_strength = current,
            new_strength,
            practice_count = state.practice_count,
            correct_count = state.correct_count,
            "updated memory strength"
        );
        Ok(state)
    }

    /// A wrong answer re-exposes the foundations: every transitive
    /// prerequisite loses 0.1 strength and gets a fresh practice timestamp,
    /// without counting as practice.
    async fn penalize_prerequisite(
        &self,
        learner_id: &str,
        skill_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SkillState> {
        let mut state = self.load_or_default(learner_id, skill_id).await?;
        let forgetting_rate = self
            .graph
            .get(skill_id)
            .map(|s| s.forgetting_rate)
            .unwrap_or(0.1);

        let current = decayed_strength(
            state.memory_strength,
            state.last_practice_time,
            forgetting_rate,
            now,
        );
        state.memory_strength = (current - 0.1).max(STRENGTH_MIN);
        state.last_practice_time = Some(now);

        tracing::debug!(
            learner_id,
            skill_id,
            new_strength = state.memory_strength,
            "penalized prerequisite after incorrect answer"
        );
        Ok(state)
    }
}
