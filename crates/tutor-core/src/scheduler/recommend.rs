//! Learning-journey recommendation: which skills need practice right now,
//! ordered by structural progression first and need second.

use crate::domain::{GradeLevel, SkillState};
use crate::graph::SkillGraph;
use crate::scheduler::decay::{decayed_strength, predict_correctness};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One skill recommended for practice.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendedSkill {
    pub skill_id: String,
    pub grade_level: GradeLevel,
    pub order: u32,
    pub probability: f64,
}

/// A skill skipped because a direct prerequisite is below threshold.
#[derive(Debug, Clone)]
pub struct SkippedSkill {
    pub skill_id: String,
    /// Unmet prerequisites with their predicted probabilities.
    pub missing_prerequisites: Vec<(String, f64)>,
}

/// Full recommendation outcome, including the narration the logs promise.
#[derive(Debug, Clone)]
pub struct RecommendationReport {
    pub recommended: Vec<RecommendedSkill>,
    pub skipped_prerequisites: Vec<SkippedSkill>,
    pub skipped_above_threshold: usize,
}

fn probability_for(
    graph: &SkillGraph,
    states: &HashMap<String, SkillState>,
    skill_id: &str,
    now: DateTime<Utc>,
) -> f64 {
    let skill = match graph.get(skill_id) {
        Some(s) => s,
        None => return 0.0,
    };
    let (strength, last_practice) = states
        .get(skill_id)
        .map(|s| (s.memory_strength, s.last_practice_time))
        .unwrap_or((0.0, None));
    let current = decayed_strength(strength, last_practice, skill.forgetting_rate, now);
    predict_correctness(current, skill.difficulty)
}

/// A skill is eligible iff its predicted correctness is below `threshold` AND
/// every direct prerequisite is at or above `threshold`. Eligible skills are
/// ranked by (grade ascending, order ascending, probability ascending), with
/// the skill id as a final tie-breaker so the result is deterministic.
pub fn recommend_skills(
    graph: &SkillGraph,
    states: &HashMap<String, SkillState>,
    now: DateTime<Utc>,
    threshold: f64,
) -> RecommendationReport {
    let mut recommended = Vec::new();
    let mut skipped_prerequisites = Vec::new();
    let mut skipped_above_threshold = 0usize;

    for skill in graph.skills() {
        let probability = probability_for(graph, states, &skill.id, now);

        let missing: Vec<(String, f64)> = skill
            .prerequisites
            .iter()
            .filter_map(|prereq| {
                let p = probability_for(graph, states, prereq, now);
                (p < threshold).then(|| (prereq.clone(), p))
            })
            .collect();

        if !missing.is_empty() {
            skipped_prerequisites.push(SkippedSkill {
                skill_id: skill.id.clone(),
                missing_prerequisites: missing,
            });
        } else if probability < threshold {
            recommended.push(RecommendedSkill {
                skill_id: skill.id.clone(),
                grade_level: skill.grade_level,
                order: skill.order,
                probability,
            });
        } else {
            skipped_above_threshold += 1;
        }
    }

    recommended.sort_by(|a, b| {
        (a.grade_level, a.order)
            .cmp(&(b.grade_level, b.order))
            .then(a.probability.partial_cmp(&b.probability).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.skill_id.cmp(&b.skill_id))
    });

    tracing::info!(
        threshold,
        recommended = recommended.len(),
        skipped_prerequisites = skipped_prerequisites.len(),
        skipped_above_threshold,
        "computed skill recommendations"
    );
    for skipped in &skipped_prerequisites {
        tracing::debug!(
            skill_id = %skipped.skill_id,
            missing = ?skipped.missing_prerequisites,
            "skill gated by unmet prerequisites"
        );
    }

    RecommendationReport {
        recommended,
        skipped_prerequisites,
        skipped_above_threshold,
    }
}
