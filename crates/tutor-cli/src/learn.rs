//! Scheduler-facing subcommands: select, attempt, assess, progress.

use anyhow::{anyhow, Result};
use chrono::Utc;
use tutor_api::{AppState, SelectedQuestionDto};
use tutor_core::{DomainError, GradeLevel};

pub async fn select(app: &AppState, learner: &str, count: usize) -> Result<()> {
    let questions = app
        .scheduler_service
        .select_batch(learner, Utc::now(), count)
        .await?;

    if questions.is_empty() {
        println!("No selectable question for {learner} (pool exhausted or all skills mastered).");
        return Ok(());
    }

    for (i, question) in questions.into_iter().enumerate() {
        let dto = SelectedQuestionDto::from(question);
        println!(
            "{}. {} [skills: {}] difficulty {:.2}, expected {:.0}s",
            i + 1,
            dto.question_id,
            dto.skill_ids.join(", "),
            dto.difficulty,
            dto.expected_time_seconds
        );
    }
    Ok(())
}

pub async fn attempt(
    app: &AppState,
    learner: &str,
    question_id: &str,
    correct: bool,
    time: f64,
) -> Result<()> {
    let question = app
        .questions
        .get(question_id)
        .ok_or_else(|| DomainError::UnknownQuestion(question_id.to_string()))?
        .clone();

    let affected = app
        .learning_service
        .record_attempt(learner, question_id, &question.skill_ids, correct, time)
        .await?;

    println!(
        "Recorded {} answer for {question_id}; updated skills: {}",
        if correct { "correct" } else { "incorrect" },
        affected.join(", ")
    );
    Ok(())
}

pub async fn assess(app: &AppState, learner: &str, grade: i32, subject: &str) -> Result<()> {
    let grade = GradeLevel::from_value(grade)
        .ok_or_else(|| anyhow!("grade must be between 0 (K) and 12"))?;

    let questions = app
        .scheduler_service
        .start_assessment(learner, subject, grade)
        .await?;

    println!("Assessment for {learner} ({subject}, {grade}): {} questions", questions.len());
    for question in questions {
        println!(
            "  {} [skills: {}] difficulty {:.2}",
            question.id,
            question.skill_ids.join(", "),
            question.difficulty
        );
    }
    Ok(())
}

pub async fn progress(app: &AppState, learner: &str) -> Result<()> {
    let scores = app
        .scheduler_service
        .skill_scores(learner, Utc::now())
        .await?;

    println!(
        "{:<24} {:>8} {:>12} {:>8} {:>9}",
        "skill", "grade", "strength", "p", "accuracy"
    );
    for score in scores {
        println!(
            "{:<24} {:>8} {:>12.3} {:>8.3} {:>8.1}%",
            score.skill_id,
            score.grade_level.to_string(),
            score.memory_strength,
            score.probability,
            score.accuracy * 100.0
        );
    }
    Ok(())
}
