use super::scheduler_service::SchedulerService;
use crate::config::DashConfig;
use crate::domain::{DomainError, GradeLevel, Question, QuestionAttempt, SkillRecord, SkillState};
use crate::graph::SkillGraph;
use crate::ports::learner_repository::MockLearnerStateRepository;
use crate::question_index::QuestionIndex;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

fn record(id: &str, grade: GradeLevel, prereqs: &[&str], difficulty: f64) -> SkillRecord {
    SkillRecord {
        id: id.to_string(),
        name: id.to_string(),
        grade_level: grade,
        prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
        forgetting_rate: 0.1,
        difficulty,
        order: None,
    }
}

fn graph() -> Arc<SkillGraph> {
    Arc::new(
        SkillGraph::load(vec![
            record("counting_1_10", GradeLevel::K, &[], 0.0),
            record("addition_basic", GradeLevel::Grade1, &["counting_1_10"], 0.5),
        ])
        .unwrap(),
    )
}

fn question(id: &str, skill: &str, difficulty: f64) -> Question {
    Question {
        id: id.to_string(),
        skill_ids: vec![skill.to_string()],
        difficulty,
        expected_time_seconds: 60.0,
    }
}

fn questions() -> Arc<QuestionIndex> {
    Arc::new(QuestionIndex::load(vec![
        question("qc1", "counting_1_10", 0.1),
        question("qc2", "counting_1_10", 0.4),
        question("qa1", "addition_basic", 0.5),
    ]))
}

fn mastered(skill_id: &str) -> SkillState {
    SkillState {
        learner_id: "learner-1".to_string(),
        skill_id: skill_id.to_string(),
        memory_strength: 4.0,
        last_practice_time: Some(Utc::now()),
        practice_count: 5,
        correct_count: 5,
    }
}

fn repo(
    states: Vec<SkillState>,
    attempts: Vec<QuestionAttempt>,
    answered: HashSet<String>,
) -> MockLearnerStateRepository {
    let mut mock = MockLearnerStateRepository::new();
    mock.expect_get_all_states()
        .returning(move |_| Ok(states.clone()));
    mock.expect_recent_attempts()
        .returning(move |_, _| Ok(attempts.clone()));
    mock.expect_attempted_question_ids()
        .returning(move |_| Ok(answered.clone()));
    mock
}

fn service(mock: MockLearnerStateRepository) -> SchedulerService {
    SchedulerService::new(graph(), questions(), Arc::new(mock), DashConfig::default())
}

#[tokio::test]
async fn fresh_learner_is_offered_the_foundational_skill() {
    let service = service(repo(vec![], vec![], HashSet::new()));

    let chosen = service
        .next_question("learner-1", Utc::now(), &HashSet::new(), None)
        .await
        .unwrap()
        .expect("a question should be selected");
    assert_eq!(chosen.skill_ids, ["counting_1_10"]);
}

#[tokio::test]
async fn exhausted_question_pool_returns_none() {
    let answered: HashSet<String> =
        ["qc1", "qc2", "qa1"].iter().map(|s| s.to_string()).collect();
    let service = service(repo(vec![], vec![], answered));

    let chosen = service
        .next_question("learner-1", Utc::now(), &HashSet::new(), None)
        .await
        .unwrap();
    assert!(chosen.is_none());
}

#[tokio::test]
async fn batch_never_repeats_a_question() {
    let service = service(repo(vec![], vec![], HashSet::new()));

    let batch = service
        .select_batch("learner-1", Utc::now(), 5)
        .await
        .unwrap();

    // Only the two counting questions are selectable for a fresh learner.
    assert_eq!(batch.len(), 2);
    let ids: HashSet<&str> = batch.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids.len(), batch.len());
}

#[tokio::test]
async fn selection_is_stable_without_new_attempts() {
    let now = Utc::now();
    let first = service(repo(vec![], vec![], HashSet::new()))
        .next_question("learner-1", now, &HashSet::new(), None)
        .await
        .unwrap();
    let second = service(repo(vec![], vec![], HashSet::new()))
        .next_question("learner-1", now, &HashSet::new(), None)
        .await
        .unwrap();
    assert_eq!(first.map(|q| q.id), second.map(|q| q.id));
}

#[tokio::test]
async fn mastered_learner_with_no_needy_skills_gets_none() {
    let states = vec![mastered("counting_1_10"), mastered("addition_basic")];
    let service = service(repo(states, vec![], HashSet::new()));

    let chosen = service
        .next_question("learner-1", Utc::now(), &HashSet::new(), None)
        .await
        .unwrap();
    assert!(chosen.is_none());
}

#[tokio::test]
async fn assessment_conflict_when_already_completed() {
    let mut mock = MockLearnerStateRepository::new();
    mock.expect_has_assessment().returning(|_, _| Ok(true));
    let service = service(mock);

    let err = service
        .start_assessment("learner-1", "math", GradeLevel::Grade3)
        .await
        .unwrap_err();
    let domain = err.downcast::<DomainError>().unwrap();
    assert!(matches!(domain, DomainError::AssessmentAlreadyCompleted { .. }));
}

#[tokio::test]
async fn assessment_records_the_handed_out_set() {
    let mut mock = MockLearnerStateRepository::new();
    mock.expect_has_assessment().returning(|_, _| Ok(false));
    mock.expect_attempted_question_ids()
        .returning(|_| Ok(HashSet::new()));
    mock.expect_record_assessment()
        .withf(|learner, subject, ids| {
            learner == "learner-1" && subject == "math" && !ids.is_empty()
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let service = service(mock);
    let questions = service
        .start_assessment("learner-1", "math", GradeLevel::Grade1)
        .await
        .unwrap();
    assert!(!questions.is_empty());
}

#[tokio::test]
async fn skill_scores_cover_every_skill_in_the_graph() {
    let service = service(repo(vec![mastered("counting_1_10")], vec![], HashSet::new()));

    let scores = service.skill_scores("learner-1", Utc::now()).await.unwrap();
    assert_eq!(scores.len(), 2);

    let counting = scores.iter().find(|s| s.skill_id == "counting_1_10").unwrap();
    assert!(counting.probability > 0.9);
    assert!((counting.accuracy - 1.0).abs() < 1e-12);

    let addition = scores.iter().find(|s| s.skill_id == "addition_basic").unwrap();
    assert_eq!(addition.practice_count, 0);
    assert_eq!(addition.accuracy, 0.0);
}
