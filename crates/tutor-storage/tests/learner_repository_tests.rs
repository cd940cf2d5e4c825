use chrono::{Duration, Utc};
use tutor_core::{LearnerStateRepository, QuestionAttempt, SkillState};
use tutor_storage::{init_test_db, SqliteLearnerRepository};

async fn repo() -> SqliteLearnerRepository {
    let pool = init_test_db().await.unwrap();
    SqliteLearnerRepository::new(pool)
}

fn state(learner: &str, skill: &str, strength: f64) -> SkillState {
    SkillState {
        learner_id: learner.to_string(),
        skill_id: skill.to_string(),
        memory_strength: strength,
        last_practice_time: Some(Utc::now()),
        practice_count: 2,
        correct_count: 1,
    }
}

fn attempt(learner: &str, question: &str, correct: bool, at: chrono::DateTime<Utc>) -> QuestionAttempt {
    QuestionAttempt {
        learner_id: learner.to_string(),
        question_id: question.to_string(),
        skill_ids: vec!["addition_basic".to_string()],
        is_correct: correct,
        response_time_seconds: 42.5,
        attempted_at: at,
    }
}

#[tokio::test]
async fn missing_state_reads_as_none() {
    let repo = repo().await;
    let found = repo.get_skill_state("learner-1", "addition_basic").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn state_upsert_round_trips() {
    let repo = repo().await;
    let mut s = state("learner-1", "addition_basic", 1.25);
    repo.save_skill_state(&s).await.unwrap();

    let found = repo
        .get_skill_state("learner-1", "addition_basic")
        .await
        .unwrap()
        .unwrap();
    assert!((found.memory_strength - 1.25).abs() < 1e-9);
    assert_eq!(found.practice_count, 2);
    assert_eq!(found.correct_count, 1);
    assert!(found.last_practice_time.is_some());

    // Second save updates in place.
    s.memory_strength = 2.0;
    s.practice_count = 3;
    repo.save_skill_state(&s).await.unwrap();

    let all = repo.get_all_states("learner-1").await.unwrap();
    assert_eq!(all.len(), 1);
    assert!((all[0].memory_strength - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn null_last_practice_round_trips() {
    let repo = repo().await;
    let mut s = state("learner-1", "counting_1_10", 0.0);
    s.last_practice_time = None;
    repo.save_skill_state(&s).await.unwrap();

    let found = repo
        .get_skill_state("learner-1", "counting_1_10")
        .await
        .unwrap()
        .unwrap();
    assert!(found.last_practice_time.is_none());
}

#[tokio::test]
async fn atomic_attempt_writes_states_and_history_together() {
    let repo = repo().await;
    let now = Utc::now();

    repo.save_attempt_atomic(
        &attempt("learner-1", "q1", false, now),
        vec![state("learner-1", "division_basic", -0.2)],
        vec![
            state("learner-1", "multiplication_tables", -0.1),
            state("learner-1", "addition_basic", -0.1),
        ],
    )
    .await
    .unwrap();

    let states = repo.get_all_states("learner-1").await.unwrap();
    assert_eq!(states.len(), 3);

    let history = repo.recent_attempts("learner-1", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question_id, "q1");
    assert_eq!(history[0].skill_ids, vec!["addition_basic"]);
    assert!(!history[0].is_correct);

    assert_eq!(repo.attempt_count("learner-1").await.unwrap(), 1);
}

#[tokio::test]
async fn recent_attempts_returns_bounded_window_oldest_first() {
    let repo = repo().await;
    let base = Utc::now();

    for i in 0..8 {
        repo.save_attempt_atomic(
            &attempt("learner-1", &format!("q{i}"), true, base + Duration::seconds(i)),
            vec![],
            vec![],
        )
        .await
        .unwrap();
    }

    let recent = repo.recent_attempts("learner-1", 5).await.unwrap();
    assert_eq!(recent.len(), 5);
    let ids: Vec<&str> = recent.iter().map(|a| a.question_id.as_str()).collect();
    assert_eq!(ids, vec!["q3", "q4", "q5", "q6", "q7"]);
}

#[tokio::test]
async fn attempted_ids_deduplicate_repeat_attempts() {
    let repo = repo().await;
    let now = Utc::now();
    repo.save_attempt_atomic(&attempt("learner-1", "q1", true, now), vec![], vec![])
        .await
        .unwrap();
    repo.save_attempt_atomic(
        &attempt("learner-1", "q1", false, now + Duration::seconds(1)),
        vec![],
        vec![],
    )
    .await
    .unwrap();

    let ids = repo.attempted_question_ids("learner-1").await.unwrap();
    assert_eq!(ids.len(), 1);
    assert!(ids.contains("q1"));
}

#[tokio::test]
async fn learners_are_isolated() {
    let repo = repo().await;
    let now = Utc::now();
    repo.save_attempt_atomic(&attempt("learner-1", "q1", true, now), vec![], vec![])
        .await
        .unwrap();

    assert!(repo.recent_attempts("learner-2", 10).await.unwrap().is_empty());
    assert_eq!(repo.attempt_count("learner-2").await.unwrap(), 0);
}

#[tokio::test]
async fn assessment_flag_round_trips() {
    let repo = repo().await;
    assert!(!repo.has_assessment("learner-1", "math").await.unwrap());

    repo.record_assessment("learner-1", "math", &["q1".to_string(), "q2".to_string()])
        .await
        .unwrap();
    assert!(repo.has_assessment("learner-1", "math").await.unwrap());
    assert!(!repo.has_assessment("learner-1", "reading").await.unwrap());
}
