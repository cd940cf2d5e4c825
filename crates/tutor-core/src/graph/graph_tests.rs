use super::*;
use crate::domain::GradeLevel;

fn record(id: &str, grade: GradeLevel, prereqs: &[&str]) -> SkillRecord {
    SkillRecord {
        id: id.to_string(),
        name: id.replace('_', " "),
        grade_level: grade,
        prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
        forgetting_rate: 0.1,
        difficulty: 0.0,
        order: None,
    }
}

#[test]
fn load_assigns_order_by_appearance_within_grade() {
    let graph = SkillGraph::load(vec![
        record("counting_1_10", GradeLevel::K, &[]),
        record("number_recognition", GradeLevel::K, &[]),
        record("addition_basic", GradeLevel::Grade1, &["counting_1_10"]),
    ])
    .unwrap();

    assert_eq!(graph.get("counting_1_10").unwrap().order, 1);
    assert_eq!(graph.get("number_recognition").unwrap().order, 2);
    assert_eq!(graph.get("addition_basic").unwrap().order, 1);
}

#[test]
fn load_keeps_explicit_order() {
    let mut rec = record("counting_1_10", GradeLevel::K, &[]);
    rec.order = Some(7);
    let graph = SkillGraph::load(vec![rec]).unwrap();
    assert_eq!(graph.get("counting_1_10").unwrap().order, 7);
}

#[test]
fn load_rejects_unknown_prerequisite() {
    let err = SkillGraph::load(vec![record("addition_basic", GradeLevel::Grade1, &["ghost"])])
        .unwrap_err();
    match err {
        DomainError::UnknownPrerequisite { skill, prerequisite } => {
            assert_eq!(skill, "addition_basic");
            assert_eq!(prerequisite, "ghost");
        }
        other => panic!("expected UnknownPrerequisite, got {other:?}"),
    }
}

#[test]
fn load_rejects_cycles() {
    let err = SkillGraph::load(vec![
        record("a", GradeLevel::K, &["b"]),
        record("b", GradeLevel::K, &["c"]),
        record("c", GradeLevel::K, &["a"]),
    ])
    .unwrap_err();
    assert!(matches!(err, DomainError::PrerequisiteCycle(_)));
}

#[test]
fn load_rejects_self_reference() {
    let err = SkillGraph::load(vec![record("a", GradeLevel::K, &["a"])]).unwrap_err();
    assert!(matches!(err, DomainError::PrerequisiteCycle(_)));
}

#[test]
fn transitive_prerequisites_preserve_first_seen_order() {
    // division -> multiplication_tables -> multiplication_intro
    //          -> addition_basic -> counting_1_10
    let graph = SkillGraph::load(vec![
        record("counting_1_10", GradeLevel::K, &[]),
        record("addition_basic", GradeLevel::Grade1, &["counting_1_10"]),
        record("multiplication_intro", GradeLevel::Grade2, &["addition_basic"]),
        record("multiplication_tables", GradeLevel::Grade3, &["multiplication_intro"]),
        record("division_basic", GradeLevel::Grade3, &["multiplication_tables"]),
    ])
    .unwrap();

    assert_eq!(
        graph.prerequisites("division_basic"),
        vec![
            "multiplication_tables",
            "multiplication_intro",
            "addition_basic",
            "counting_1_10"
        ]
    );
}

#[test]
fn shared_prerequisites_are_deduplicated() {
    let graph = SkillGraph::load(vec![
        record("base", GradeLevel::K, &[]),
        record("left", GradeLevel::Grade1, &["base"]),
        record("right", GradeLevel::Grade1, &["base"]),
        record("top", GradeLevel::Grade2, &["left", "right"]),
    ])
    .unwrap();

    assert_eq!(graph.prerequisites("top"), vec!["left", "base", "right"]);
}

#[test]
fn prerequisites_of_unknown_skill_is_empty() {
    let graph = SkillGraph::load(vec![record("a", GradeLevel::K, &[])]).unwrap();
    assert!(graph.prerequisites("missing").is_empty());
}
