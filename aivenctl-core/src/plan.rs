//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::resource::{ResourceId, State, Value};

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of mutating Effects
    pub fn mutation_count(&self) -> usize {
        self.effects.iter().filter(|e| e.is_mutating()).count()
    }

    /// True when nothing but data source reads is planned
    pub fn has_no_changes(&self) -> bool {
        self.mutation_count() == 0
    }

    /// Resources this plan would remove (delete or replace) although their
    /// current state has `attribute` set to true
    pub fn protected_removals(
        &self,
        current_states: &HashMap<ResourceId, State>,
        attribute: &str,
    ) -> Vec<&ResourceId> {
        let protected = |state: Option<&State>| {
            state.is_some_and(|s| s.attributes.get(attribute) == Some(&Value::Bool(true)))
        };
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Replace { id, from, .. } if protected(Some(from)) => Some(id),
                Effect::Delete { id, .. } if protected(current_states.get(id)) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Read(_) => summary.read += 1,
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                Effect::Delete { .. } => summary.delete += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub read: usize,
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;

    #[test]
    fn summary_counts_each_kind() {
        let mut plan = Plan::new();
        plan.add(Effect::Read(Resource::new("project", "p").with_read_only(true)));
        plan.add(Effect::Create(Resource::new("pg", "db")));
        plan.add(Effect::Delete {
            id: ResourceId::new("kafka_topic", "events"),
            identifier: "acme/kafka/events".to_string(),
        });

        let summary = plan.summary();
        assert_eq!(summary.read, 1);
        assert_eq!(plan.mutation_count(), 2);
        assert_eq!(
            summary.to_string(),
            "Plan: 1 to create, 0 to update, 0 to replace, 1 to delete"
        );
    }

    #[test]
    fn protected_removals_are_reported() {
        let topic = ResourceId::new("kafka_topic", "events");
        let other = ResourceId::new("kafka_topic", "logs");
        let protected = State::existing(
            topic.clone(),
            HashMap::from([(
                "termination_protection".to_string(),
                Value::Bool(true),
            )]),
        );
        let current = HashMap::from([
            (topic.clone(), protected.clone()),
            (other.clone(), State::existing(other.clone(), HashMap::new())),
        ]);

        let mut plan = Plan::new();
        plan.add(Effect::Delete {
            id: topic.clone(),
            identifier: "acme/kafka/events".to_string(),
        });
        plan.add(Effect::Delete {
            id: other.clone(),
            identifier: "acme/kafka/logs".to_string(),
        });
        assert_eq!(
            plan.protected_removals(&current, "termination_protection"),
            vec![&topic]
        );

        let mut plan = Plan::new();
        plan.add(Effect::Replace {
            id: topic.clone(),
            from: protected,
            to: Resource::new("kafka_topic", "events"),
            changed_attributes: vec!["topic_name".to_string()],
        });
        assert_eq!(plan.protected_removals(&HashMap::new(), "termination_protection").len(), 1);
    }

    #[test]
    fn reads_only_is_no_change() {
        let mut plan = Plan::new();
        plan.add(Effect::Read(Resource::new("project", "p").with_read_only(true)));
        assert!(!plan.is_empty());
        assert!(plan.has_no_changes());
    }
}
