//! The immutable skill graph: a DAG of skills with grade/order placement.
//! A malformed graph (unknown prerequisite, cycle) fails at load time, before
//! any scheduling runs.

use crate::domain::{DomainError, GradeLevel, Skill, SkillRecord};
use std::collections::HashMap;

#[cfg(test)]
mod graph_tests;

#[derive(Debug, Clone)]
pub struct SkillGraph {
    skills: HashMap<String, Skill>,
}

impl SkillGraph {
    /// Build the graph from loader records. Order, when absent, is assigned
    /// by appearance within the grade. Every prerequisite must resolve and
    /// the prerequisite relation must be acyclic.
    pub fn load(records: Vec<SkillRecord>) -> Result<Self, DomainError> {
        let mut skills = HashMap::with_capacity(records.len());
        let mut grade_order: HashMap<GradeLevel, u32> = HashMap::new();

        for record in records {
            let order = match record.order {
                Some(order) if order > 0 => order,
                _ => {
                    let next = grade_order.entry(record.grade_level).or_insert(0);
                    *next += 1;
                    *next
                }
            };
            let skill = Skill {
                id: record.id.clone(),
                name: record.name,
                grade_level: record.grade_level,
                order,
                forgetting_rate: record.forgetting_rate,
                difficulty: record.difficulty,
                prerequisites: record.prerequisites,
            };
            skills.insert(record.id, skill);
        }

        for skill in skills.values() {
            for prereq in &skill.prerequisites {
                if !skills.contains_key(prereq) {
                    return Err(DomainError::UnknownPrerequisite {
                        skill: skill.id.clone(),
                        prerequisite: prereq.clone(),
                    });
                }
            }
        }

        let graph = Self { skills };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), DomainError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for start in self.skills.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }
            // Iterative DFS with an explicit stack of (node, next-child index).
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            marks.insert(start.as_str(), Mark::Visiting);
            while let Some((node, child_idx)) = stack.pop() {
                let prereqs = &self.skills[node].prerequisites;
                if child_idx < prereqs.len() {
                    stack.push((node, child_idx + 1));
                    let child = prereqs[child_idx].as_str();
                    match marks.get(child) {
                        Some(Mark::Visiting) => {
                            return Err(DomainError::PrerequisiteCycle(child.to_string()))
                        }
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(child, Mark::Visiting);
                            stack.push((child, 0));
                        }
                    }
                } else {
                    marks.insert(node, Mark::Done);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, skill_id: &str) -> Option<&Skill> {
        self.skills.get(skill_id)
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        self.skills.contains_key(skill_id)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn skills(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    pub fn direct_prerequisites(&self, skill_id: &str) -> &[String] {
        self.skills
            .get(skill_id)
            .map(|s| s.prerequisites.as_slice())
            .unwrap_or(&[])
    }

    /// The transitive prerequisite closure, depth-first, deduplicated while
    /// preserving first-seen order. An unknown skill yields an empty list.
    pub fn prerequisites(&self, skill_id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut seen = std::collections::HashSet::new();
        self.collect_prerequisites(skill_id, &mut result, &mut seen);
        result
    }

    fn collect_prerequisites(
        &self,
        skill_id: &str,
        result: &mut Vec<String>,
        seen: &mut std::collections::HashSet<String>,
    ) {
        let Some(skill) = self.skills.get(skill_id) else {
            return;
        };
        for prereq in &skill.prerequisites {
            if seen.insert(prereq.clone()) {
                result.push(prereq.clone());
                self.collect_prerequisites(prereq, result, seen);
            }
        }
    }
}
