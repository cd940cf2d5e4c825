use crate::config::DashConfig;
use crate::domain::{DomainError, GradeLevel, Question, SkillScore};
use crate::graph::SkillGraph;
use crate::ports::LearnerStateRepository;
use crate::question_index::QuestionIndex;
use crate::scheduler::{
    analyze_recent, decayed_strength, predict_correctness, recommend_skills, select_assessment,
    select_question, RecommendationReport,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Question selection over the pure scheduler: fetches a learner-state
/// snapshot, computes recommendations and adaptive difficulty, and picks
/// questions. Selection never mutates learner state.
pub struct SchedulerService {
    graph: Arc<SkillGraph>,
    questions: Arc<QuestionIndex>,
    repo: Arc<dyn LearnerStateRepository>,
    config: DashConfig,
}

impl SchedulerService {
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

    async fn state_snapshot(
        &self,
        learner_id: &str,
    ) -> Result<HashMap<String, crate::domain::SkillState>> {
        let states = self.repo.get_all_states(learner_id).await?;
        Ok(states
            .into_iter()
            .map(|s| (s.skill_id.clone(), s))
            .collect())
    }

    /// Skills needing practice, in learning-journey order.
    pub async fn recommended_skills(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RecommendationReport> {
        let states = self.state_snapshot(learner_id).await?;
        Ok(recommend_skills(
            &self.graph,
            &states,
            now,
            self.config.probability_threshold,
        ))
    }

    /// Pick the next question, excluding everything already answered plus the
    /// caller's extra exclusions (e.g. questions chosen earlier in a batch).
    pub async fn next_question(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        extra_exclude: &HashSet<String>,
        skill_exclude: Option<&HashSet<String>>,
    ) -> Result<Option<Question>> {
        let report = self.recommended_skills(learner_id, now).await?;
        if report.recommended.is_empty() {
            return Ok(None);
        }

        let mut exclude = self.repo.attempted_question_ids(learner_id).await?;
        exclude.extend(extra_exclude.iter().cloned());

        let attempts = self
            .repo
            .recent_attempts(learner_id, self.config.lookback_count as u32)
            .await?;
        let analysis = analyze_recent(&attempts, &self.questions, self.config.lookback_count);

        Ok(select_question(
            &self.graph,
            &self.questions,
            &report.recommended,
            analysis.difficulty_offset,
            &exclude,
            skill_exclude,
        )
        .cloned())
    }

    /// Select up to `sample_size` questions, excluding each pick from the
    /// next round so a batch never repeats a question.
    pub async fn select_batch(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        sample_size: usize,
    ) -> Result<Vec<Question>> {
        let mut selected = Vec::new();
        let mut exclude: HashSet<String> = HashSet::new();

        for _ in 0..sample_size {
            match self.next_question(learner_id, now, &exclude, None).await? {
                Some(question) => {
                    exclude.insert(question.id.clone());
                    selected.push(question);
                }
                None => break,
            }
        }

        tracing::info!(
            learner_id,
            requested = sample_size,
            selected = selected.len(),
            "selected question batch"
        );
        Ok(selected)
    }

    /// Build the 10-question assessment for a learner grade. Conflicts when
    /// the learner already completed an assessment for the subject.
    pub async fn start_assessment(
        &self,
        learner_id: &str,
        subject: &str,
        learner_grade: GradeLevel,
    ) -> Result<Vec<Question>> {
        if self.repo.has_assessment(learner_id, subject).await? {
            return Err(DomainError::AssessmentAlreadyCompleted {
                learner_id: learner_id.to_string(),
                subject: subject.to_string(),
            }
            .into());
        }

        let exclude = self.repo.attempted_question_ids(learner_id).await?;
        let questions: Vec<Question> =
            select_assessment(&self.graph, &self.questions, learner_grade, &exclude)
                .into_iter()
                .cloned()
                .collect();

        let ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        self.repo.record_assessment(learner_id, subject, &ids).await?;
        Ok(questions)
    }

    /// Per-skill snapshot of strength/probability/accuracy for reporting.
    pub async fn skill_scores(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SkillScore>> {
        let states = self.state_snapshot(learner_id).await?;
        let mut scores: Vec<SkillScore> = self
            .graph
            .skills()
            .map(|skill| {
                let (strength, last, practice, correct) = states
                    .get(&skill.id)
                    .map(|s| {
                        (
                            s.memory_strength,
                            s.last_practice_time,
                            s.practice_count,
                            s.correct_count,
                        )
                    })
                    .unwrap_or((0.0, None, 0, 0));
                let current = decayed_strength(strength, last, skill.forgetting_rate, now);
                SkillScore {
                    skill_id: skill.id.clone(),
                    name: skill.name.clone(),
                    grade_level: skill.grade_level,
                    memory_strength: current,
                    probability: predict_correctness(current, skill.difficulty),
                    practice_count: practice,
                    correct_count: correct,
                    accuracy: if practice > 0 {
                        correct as f64 / practice as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        scores.sort_by(|a, b| {
            (a.grade_level, a.skill_id.as_str()).cmp(&(b.grade_level, b.skill_id.as_str()))
        });
        Ok(scores)
    }
}
