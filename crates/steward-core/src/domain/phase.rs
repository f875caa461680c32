//! User-facing phase aggregation.
//!
//! Collapses the ordered subtask records of one tree into a short list of
//! phases keyed by group type, each with a single displayed state. Pure
//! functions over records so the rules are testable without a store.

use std::collections::HashMap;

use super::ids::TaskId;
use super::record::TaskRecord;
use super::state::{TaskState, merge_phase_state};
use super::task_type::GroupType;
use serde::{Deserialize, Serialize};

/// One displayed phase of a task tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub group_type: GroupType,
    pub state: TaskState,

    /// Best-effort progress hints from the task cache, one per subtask that
    /// published any.
    pub details: Vec<serde_json::Value>,
}

impl PhaseProgress {
    fn new(group_type: GroupType) -> Self {
        Self {
            group_type,
            // Lowest precedence: the first member observation always wins.
            state: TaskState::Unknown,
            details: Vec::new(),
        }
    }
}

/// Aggregate ordered subtask records into display phases.
///
/// Buckets open in first-seen order. When a group type reappears later in the
/// sequence (pattern A,B,A), its members are re-attached to the most recently
/// opened bucket instead of opening a new one, so the phase list never moves
/// backward on screen. Each bucket's state is the precedence merge of its
/// members' states.
pub fn aggregate_phases(
    sub_tasks: &[TaskRecord],
    hints: &HashMap<TaskId, serde_json::Value>,
) -> Vec<PhaseProgress> {
    let mut phases: Vec<PhaseProgress> = Vec::new();
    let mut seen: HashMap<GroupType, usize> = HashMap::new();
    let mut last_opened: Option<usize> = None;

    for record in sub_tasks {
        let Some(group_type) = &record.group_type else {
            continue;
        };
        let index = if seen.contains_key(group_type) {
            // Repeated type: fold into the most recently opened phase so the
            // display order stays stable for patterns like A B A B C.
            match last_opened {
                Some(index) => index,
                None => continue,
            }
        } else {
            let index = phases.len();
            phases.push(PhaseProgress::new(group_type.clone()));
            seen.insert(group_type.clone(), index);
            last_opened = Some(index);
            index
        };

        let phase = &mut phases[index];
        if let Some(hint) = hints.get(&record.id) {
            phase.details.push(hint.clone());
        }
        phase.state = merge_phase_state(phase.state, record.state);
    }

    phases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;

    fn sub_task(parent: TaskId, position: u32, group: &str, state: TaskState) -> TaskRecord {
        let mut record = TaskRecord::new_sub_task(
            TaskId::generate(),
            parent,
            position,
            TaskType::new("test.noop.v1"),
            GroupType::new(group),
            serde_json::json!({}),
            "owner-1".to_string(),
        );
        record.state = state;
        record
    }

    #[test]
    fn repeated_group_type_does_not_reopen_a_phase() {
        let parent = TaskId::generate();
        let records = vec![
            sub_task(parent, 0, "A", TaskState::Success),
            sub_task(parent, 1, "B", TaskState::Success),
            sub_task(parent, 2, "A", TaskState::Success),
        ];

        let phases = aggregate_phases(&records, &HashMap::new());

        let names: Vec<&str> = phases.iter().map(|p| p.group_type.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn repeated_member_merges_into_most_recent_bucket() {
        let parent = TaskId::generate();
        let records = vec![
            sub_task(parent, 0, "A", TaskState::Success),
            sub_task(parent, 1, "B", TaskState::Success),
            sub_task(parent, 2, "A", TaskState::Failure),
        ];

        let phases = aggregate_phases(&records, &HashMap::new());

        // The late failing A member lands in the B bucket, the open one.
        assert_eq!(phases[0].state, TaskState::Success);
        assert_eq!(phases[1].state, TaskState::Failure);
    }

    #[test]
    fn one_failing_leaf_fails_the_phase() {
        let parent = TaskId::generate();
        let records = vec![
            sub_task(parent, 0, "A", TaskState::Success),
            sub_task(parent, 1, "A", TaskState::Failure),
            sub_task(parent, 2, "A", TaskState::Success),
        ];

        let phases = aggregate_phases(&records, &HashMap::new());
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].state, TaskState::Failure);
    }

    #[test]
    fn successful_phase_with_new_created_leaf_shows_running() {
        let parent = TaskId::generate();
        let records = vec![
            sub_task(parent, 0, "A", TaskState::Success),
            sub_task(parent, 1, "A", TaskState::Created),
        ];

        let phases = aggregate_phases(&records, &HashMap::new());
        assert_eq!(phases[0].state, TaskState::Running);
    }

    #[test]
    fn cache_hints_are_attached_to_the_phase() {
        let parent = TaskId::generate();
        let records = vec![
            sub_task(parent, 0, "A", TaskState::Running),
            sub_task(parent, 1, "A", TaskState::Created),
        ];
        let mut hints = HashMap::new();
        hints.insert(records[0].id, serde_json::json!({"copied_gb": 12}));

        let phases = aggregate_phases(&records, &hints);
        assert_eq!(phases[0].details, vec![serde_json::json!({"copied_gb": 12})]);
    }

    #[test]
    fn empty_subtask_list_yields_no_phases() {
        assert!(aggregate_phases(&[], &HashMap::new()).is_empty());
    }
}
