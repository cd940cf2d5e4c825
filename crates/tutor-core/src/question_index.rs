//! O(1) lookup tables over the question bank: id -> question and
//! skill id -> question ids, built once at load.

use crate::domain::Question;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct QuestionIndex {
    by_id: HashMap<String, Question>,
    /// Question ids per skill, in load order so selection ties are stable.
    by_skill: HashMap<String, Vec<String>>,
}

impl QuestionIndex {
    pub fn load(questions: Vec<Question>) -> Self {
        let mut by_id = HashMap::with_capacity(questions.len());
        let mut by_skill: HashMap<String, Vec<String>> = HashMap::new();

        for question in questions {
            for skill_id in &question.skill_ids {
                by_skill
                    .entry(skill_id.clone())
                    .or_default()
                    .push(question.id.clone());
            }
            by_id.insert(question.id.clone(), question);
        }

        Self { by_id, by_skill }
    }

    pub fn get(&self, question_id: &str) -> Option<&Question> {
        self.by_id.get(question_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn question_ids_for_skill(&self, skill_id: &str) -> &[String] {
        self.by_skill
            .get(skill_id)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Questions for a skill, minus the exclusion set, optionally narrowed by
    /// a predicate. Returned in stable load order.
    pub fn filter<'a>(
        &'a self,
        skill_id: &str,
        exclude: &HashSet<String>,
        predicate: impl Fn(&Question) -> bool,
    ) -> Vec<&'a Question> {
        self.question_ids_for_skill(skill_id)
            .iter()
            .filter(|id| !exclude.contains(id.as_str()))
            .filter_map(|id| self.by_id.get(id))
            .filter(|q| predicate(q))
            .collect()
    }

    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.by_id.values()
    }
}
