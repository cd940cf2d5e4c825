//! Question selection: walk the recommended skills in journey order, prefer
//! candidates inside the adaptive difficulty window, fall back to the closest
//! match, and never return an excluded question.

use crate::domain::{GradeLevel, Question};
use crate::graph::SkillGraph;
use crate::question_index::QuestionIndex;
use crate::scheduler::recommend::RecommendedSkill;
use std::collections::HashSet;

/// Half-width of the acceptable difficulty window around the target.
pub const DIFFICULTY_WINDOW: f64 = 0.2;

/// Diversification retries per assessment slot before settling for any skill.
const DIVERSIFY_RETRIES: usize = 5;

fn closest_to_target<'a>(candidates: &[&'a Question], target: f64) -> Option<&'a Question> {
    candidates
        .iter()
        .min_by(|a, b| {
            let da = (a.difficulty - target).abs();
            let db = (b.difficulty - target).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied()
}

/// Pick the next question for the recommendation list. `difficulty_offset`
/// shifts each skill's target difficulty; `exclude` holds already-answered
/// and already-chosen question ids; `skill_exclude` optionally removes whole
/// skills from consideration.
pub fn select_question<'a>(
    graph: &SkillGraph,
    questions: &'a QuestionIndex,
    recommendations: &[RecommendedSkill],
    difficulty_offset: f64,
    exclude: &HashSet<String>,
    skill_exclude: Option<&HashSet<String>>,
) -> Option<&'a Question> {
    for (position, recommendation) in recommendations.iter().enumerate() {
        if let Some(skip) = skill_exclude {
            if skip.contains(&recommendation.skill_id) {
                continue;
            }
        }
        let Some(skill) = graph.get(&recommendation.skill_id) else {
            continue;
        };

        let target = skill.difficulty + difficulty_offset;
        let min_difficulty = (target - DIFFICULTY_WINDOW).max(0.0);
        let max_difficulty = target + DIFFICULTY_WINDOW;

        let candidates = questions.filter(&skill.id, exclude, |_| true);
        if candidates.is_empty() {
            tracing::debug!(skill_id = %skill.id, "no unanswered candidates for skill");
            continue;
        }

        let in_window: Vec<&Question> = candidates
            .iter()
            .filter(|q| q.difficulty >= min_difficulty && q.difficulty <= max_difficulty)
            .copied()
            .collect();

        if let Some(chosen) = closest_to_target(&in_window, target) {
            tracing::info!(
                skill_id = %skill.id,
                question_id = %chosen.id,
                target,
                min_difficulty,
                max_difficulty,
                skill_position = position + 1,
                in_window = in_window.len(),
                "selected question within difficulty window"
            );
            return Some(chosen);
        }

        // Nothing in the window; take the closest overall so a recommended
        // skill always yields a question when any candidate remains.
        let chosen = closest_to_target(&candidates, target)?;
        tracing::info!(
            skill_id = %skill.id,
            question_id = %chosen.id,
            target,
            difficulty = chosen.difficulty,
            "difficulty window empty; selected closest candidate (fallback)"
        );
        return Some(chosen);
    }

    tracing::info!(
        recommended = recommendations.len(),
        excluded = exclude.len(),
        "no selectable question for any recommended skill"
    );
    None
}

/// Deterministic assessment grade distribution for a learner of grade `g`:
/// {g-2: 2, g-1: 4, g: 2, g+1: 2}, each bucket clamped into Grade1..=Grade12.
pub fn assessment_distribution(grade: GradeLevel) -> Vec<(GradeLevel, usize)> {
    vec![
        (grade.offset_clamped(-2), 2),
        (grade.offset_clamped(-1), 4),
        (grade.offset_clamped(0), 2),
        (grade.offset_clamped(1), 2),
    ]
}

/// Select assessment questions following the grade distribution, trying to
/// diversify skills within each bucket with a bounded number of retries per
/// slot. Buckets short on questions contribute what they have.
pub fn select_assessment<'a>(
    graph: &SkillGraph,
    questions: &'a QuestionIndex,
    learner_grade: GradeLevel,
    exclude: &HashSet<String>,
) -> Vec<&'a Question> {
    let mut chosen: Vec<&Question> = Vec::new();
    let mut chosen_ids: HashSet<String> = exclude.clone();

    for (grade, count) in assessment_distribution(learner_grade) {
        let mut bucket_skills: Vec<&str> = graph
            .skills()
            .filter(|s| s.grade_level == grade)
            .map(|s| s.id.as_str())
            .collect();
        bucket_skills.sort_unstable();

        if bucket_skills.is_empty() {
            tracing::warn!(%grade, "no skills available for assessment bucket");
            continue;
        }

        let mut used_skills: HashSet<&str> = HashSet::new();
        let mut cursor = 0usize;

        for _ in 0..count {
            let mut picked = None;
            for retry in 0..=DIVERSIFY_RETRIES {
                let skill_id = bucket_skills[cursor % bucket_skills.len()];
                cursor += 1;
                // Prefer an unused skill while retries remain.
                if retry < DIVERSIFY_RETRIES && used_skills.contains(skill_id) {
                    continue;
                }
                let candidates = questions.filter(skill_id, &chosen_ids, |_| true);
                if let Some(question) = candidates.first() {
                    picked = Some((skill_id, *question));
                    break;
                }
            }
            if let Some((skill_id, question)) = picked {
                used_skills.insert(skill_id);
                chosen_ids.insert(question.id.clone());
                chosen.push(question);
            }
        }
    }

    tracing::info!(
        learner_grade = %learner_grade,
        selected = chosen.len(),
        "assembled assessment question set"
    );
    chosen
}
