use super::learning_service::LearningService;
use crate::config::DashConfig;
use crate::domain::{GradeLevel, Question, QuestionAttempt, SkillRecord, SkillState};
use crate::graph::SkillGraph;
use crate::ports::learner_repository::MockLearnerStateRepository;
use crate::question_index::QuestionIndex;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn record(id: &str, grade: GradeLevel, prereqs: &[&str]) -> SkillRecord {
    SkillRecord {
        id: id.to_string(),
        name: id.to_string(),
        grade_level: grade,
        prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
        forgetting_rate: 0.1,
        difficulty: 0.0,
        order: None,
    }
}

/// counting -> addition -> multiplication_intro -> multiplication_tables
/// -> division, matching the arithmetic ladder used across the suite.
fn graph() -> Arc<SkillGraph> {
    Arc::new(
        SkillGraph::load(vec![
            record("counting_1_10", GradeLevel::K, &[]),
            record("addition_basic", GradeLevel::Grade1, &["counting_1_10"]),
            record("multiplication_intro", GradeLevel::Grade2, &["addition_basic"]),
            record("multiplication_tables", GradeLevel::Grade3, &["multiplication_intro"]),
            record("division_basic", GradeLevel::Grade3, &["multiplication_tables"]),
        ])
        .unwrap(),
    )
}

fn questions() -> Arc<QuestionIndex> {
    Arc::new(QuestionIndex::load(vec![Question {
        id: "q1".to_string(),
        skill_ids: vec!["addition_basic".to_string()],
        difficulty: 0.0,
        expected_time_seconds: 60.0,
    }]))
}

type SavedWrite = (QuestionAttempt, Vec<SkillState>, Vec<SkillState>);

/// Mock repository backed by a state map, capturing the atomic write.
fn repo_with_states(
    states: HashMap<String, SkillState>,
    saved: Arc<Mutex<Vec<SavedWrite>>>,
) -> MockLearnerStateRepository {
    let mut mock = MockLearnerStateRepository::new();

    mock.expect_get_skill_state().returning(move |_, skill_id| {
        Ok(states.get(skill_id).cloned())
    });

    mock.expect_save_attempt_atomic().returning(
        move |attempt, primary, prerequisites| {
            saved
                .lock()
                .unwrap()
                .push((attempt.clone(), primary, prerequisites));
            Ok(())
        },
    );

    mock
}

fn service(repo: MockLearnerStateRepository) -> LearningService {
    LearningService::new(graph(), questions(), Arc::new(repo), DashConfig::default())
}

#[tokio::test]
async fn fresh_learner_correct_answer_reaches_full_strength() {
    // Fresh state, correct in 30s: strength = min(5, 0 + 1/(1+0) * 1.0) = 1.0.
    let saved = Arc::new(Mutex::new(Vec::new()));
    let service = service(repo_with_states(HashMap::new(), saved.clone()));

    let affected = service
        .record_attempt("learner-1", "q1", &["addition_basic".to_string()], true, 30.0)
        .await
        .unwrap();

    assert_eq!(affected, vec!["addition_basic"]);

    let writes = saved.lock().unwrap();
    let (attempt, primary, prerequisites) = &writes[0];
    assert!(attempt.is_correct);
    assert!(prerequisites.is_empty(), "correct answers do not touch prerequisites");

    let state = &primary[0];
    assert!((state.memory_strength - 1.0).abs() < 1e-9);
    assert_eq!(state.practice_count, 1);
    assert_eq!(state.correct_count, 1);
    assert!(state.last_practice_time.is_some());
}

#[tokio::test]
async fn slow_correct_answer_gets_halved_increment() {
    let saved = Arc::new(Mutex::new(Vec::new()));
    let service = service(repo_with_states(HashMap::new(), saved.clone()));

    service
        .record_attempt("learner-1", "q1", &["addition_basic".to_string()], true, 200.0)
        .await
        .unwrap();

    let writes = saved.lock().unwrap();
    let state = &writes[0].1[0];
    assert!((state.memory_strength - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn response_exactly_at_threshold_is_not_penalized() {
    let saved = Arc::new(Mutex::new(Vec::new()));
    let service = service(repo_with_states(HashMap::new(), saved.clone()));

    service
        .record_attempt("learner-1", "q1", &["addition_basic".to_string()], true, 180.0)
        .await
        .unwrap();

    let writes = saved.lock().unwrap();
    assert!((writes[0].1[0].memory_strength - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn incorrect_answer_penalizes_every_transitive_prerequisite() {
    let saved = Arc::new(Mutex::new(Vec::new()));
    let service = service(repo_with_states(HashMap::new(), saved.clone()));

    let affected = service
        .record_attempt("learner-1", "qX", &["division_basic".to_string()], false, 45.0)
        .await
        .unwrap();

    assert_eq!(
        affected,
        vec![
            "division_basic",
            "multiplication_tables",
            "multiplication_intro",
            "addition_basic",
            "counting_1_10",
        ]
    );

    let writes = saved.lock().unwrap();
    let (_, primary, prerequisites) = &writes[0];

    // The practiced skill drops by 0.2 and counts the practice.
    let direct = &primary[0];
    assert!((direct.memory_strength - (-0.2)).abs() < 1e-9);
    assert_eq!(direct.practice_count, 1);
    assert_eq!(direct.correct_count, 0);

    // Every prerequisite drops by 0.1, gets a practice timestamp, and does
    // not count the practice.
    assert_eq!(prerequisites.len(), 4);
    for state in prerequisites {
        assert!((state.memory_strength - (-0.1)).abs() < 1e-9);
        assert_eq!(state.practice_count, 0);
        assert_eq!(state.correct_count, 0);
        assert!(state.last_practice_time.is_some());
    }
}

#[tokio::test]
async fn strength_is_clamped_at_the_floor() {
    let mut states = HashMap::new();
    let now = Utc::now();
    states.insert(
        "division_basic".to_string(),
        SkillState {
            learner_id: "learner-1".to_string(),
            skill_id: "division_basic".to_string(),
            memory_strength: -1.95,
            last_practice_time: Some(now),
            practice_count: 3,
            correct_count: 0,
        },
    );
    states.insert(
        "multiplication_tables".to_string(),
        SkillState {
            learner_id: "learner-1".to_string(),
            skill_id: "multiplication_tables".to_string(),
            memory_strength: -2.0,
            last_practice_time: Some(now),
            practice_count: 0,
            correct_count: 0,
        },
    );

    let saved = Arc::new(Mutex::new(Vec::new()));
    let service = service(repo_with_states(states, saved.clone()));

    service
        .record_attempt_at(
            "learner-1",
            "qX",
            &["division_basic".to_string()],
            false,
            45.0,
            now,
        )
        .await
        .unwrap();

    let writes = saved.lock().unwrap();
    let (_, primary, prerequisites) = &writes[0];
    assert!(primary[0].memory_strength >= -2.0);
    for state in prerequisites {
        assert!(state.memory_strength >= -2.0);
    }
}

#[tokio::test]
async fn strength_is_clamped_at_the_ceiling() {
    let mut states = HashMap::new();
    let now = Utc::now();
    states.insert(
        "addition_basic".to_string(),
        SkillState {
            learner_id: "learner-1".to_string(),
            skill_id: "addition_basic".to_string(),
            memory_strength: 4.9,
            last_practice_time: Some(now),
            practice_count: 10,
            correct_count: 2,
        },
    );

    let saved = Arc::new(Mutex::new(Vec::new()));
    let service = service(repo_with_states(states, saved.clone()));

    service
        .record_attempt_at(
            "learner-1",
            "q1",
            &["addition_basic".to_string()],
            true,
            10.0,
            now,
        )
        .await
        .unwrap();

    let writes = saved.lock().unwrap();
    assert!(writes[0].1[0].memory_strength <= 5.0);
}

#[tokio::test]
async fn correct_count_never_exceeds_practice_count() {
    let saved = Arc::new(Mutex::new(Vec::new()));
    let service = service(repo_with_states(HashMap::new(), saved.clone()));

    for correct in [true, false, true] {
        service
            .record_attempt("learner-1", "q1", &["addition_basic".to_string()], correct, 30.0)
            .await
            .unwrap();
    }

    for (_, primary, prerequisites) in saved.lock().unwrap().iter() {
        for state in primary.iter().chain(prerequisites.iter()) {
            assert!(state.correct_count <= state.practice_count);
        }
    }
}

#[tokio::test]
async fn diminishing_returns_on_repeated_correct_answers() {
    let now = Utc::now();
    let mut states = HashMap::new();
    states.insert(
        "addition_basic".to_string(),
        SkillState {
            learner_id: "learner-1".to_string(),
            skill_id: "addition_basic".to_string(),
            memory_strength: 1.0,
            last_practice_time: Some(now),
            practice_count: 3,
            correct_count: 3,
        },
    );

    let saved = Arc::new(Mutex::new(Vec::new()));
    let service = service(repo_with_states(states, saved.clone()));

    service
        .record_attempt_at(
            "learner-1",
            "q1",
            &["addition_basic".to_string()],
            true,
            30.0,
            now,
        )
        .await
        .unwrap();

    // increment = 1 / (1 + 0.1 * 3) ~= 0.769
    let writes = saved.lock().unwrap();
    let state = &writes[0].1[0];
    assert!((state.memory_strength - (1.0 + 1.0 / 1.3)).abs() < 1e-9);
    assert_eq!(state.correct_count, 4);
}
