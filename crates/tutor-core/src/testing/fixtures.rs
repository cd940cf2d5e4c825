//! A small arithmetic curriculum used across the test suite: the classic
//! counting -> addition -> multiplication -> division ladder.

use crate::domain::{GradeLevel, Question, SkillRecord};

fn skill(
    id: &str,
    name: &str,
    grade: GradeLevel,
    prereqs: &[&str],
    forgetting_rate: f64,
) -> SkillRecord {
    SkillRecord {
        id: id.to_string(),
        name: name.to_string(),
        grade_level: grade,
        prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
        forgetting_rate,
        difficulty: 0.0,
        order: None,
    }
}

pub fn sample_curriculum() -> Vec<SkillRecord> {
    vec![
        skill("counting_1_10", "Counting 1-10", GradeLevel::K, &[], 0.05),
        skill("number_recognition", "Number Recognition", GradeLevel::K, &[], 0.05),
        skill("basic_shapes", "Basic Shapes", GradeLevel::K, &[], 0.08),
        skill("addition_basic", "Basic Addition", GradeLevel::Grade1, &["counting_1_10"], 0.07),
        skill(
            "subtraction_basic",
            "Basic Subtraction",
            GradeLevel::Grade1,
            &["counting_1_10"],
            0.07,
        ),
        skill(
            "multiplication_intro",
            "Introduction to Multiplication",
            GradeLevel::Grade2,
            &["addition_basic"],
            0.09,
        ),
        skill(
            "multiplication_tables",
            "Multiplication Tables",
            GradeLevel::Grade3,
            &["multiplication_intro"],
            0.08,
        ),
        skill(
            "division_basic",
            "Basic Division",
            GradeLevel::Grade3,
            &["multiplication_tables"],
            0.09,
        ),
    ]
}

/// Three questions per skill at difficulties 0.2 / 0.5 / 0.8.
pub fn sample_questions() -> Vec<Question> {
    sample_curriculum()
        .iter()
        .flat_map(|skill| {
            [(1, 0.2), (2, 0.5), (3, 0.8)].map(|(n, difficulty)| Question {
                id: format!("q-{}-{}", skill.id, n),
                skill_ids: vec![skill.id.clone()],
                difficulty,
                expected_time_seconds: 60.0,
            })
        })
        .collect()
}
