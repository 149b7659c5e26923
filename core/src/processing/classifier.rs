use crate::store::Assignments;
use crate::tag_interface::{AccumulatedDetectionSet, TagId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Present,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub tag_id: TagId,
    pub object_name: String,
    pub status: PresenceStatus,
}

impl PresenceEntry {
    pub fn is_present(&self) -> bool {
        self.status == PresenceStatus::Present
    }
}

/// Present/missing status for every assignment, in assignment order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceReport {
    pub entries: Vec<PresenceEntry>,
}

impl PresenceReport {
    /// Object names present now that were not present in `previous`.
    ///
    /// Keyed by tag, so two objects sharing a name are tracked separately.
    pub fn newly_present(&self, previous: &PresenceReport) -> Vec<String> {
        let before: HashSet<&TagId> = previous
            .entries
            .iter()
            .filter(|entry| entry.is_present())
            .map(|entry| &entry.tag_id)
            .collect();

        self.entries
            .iter()
            .filter(|entry| entry.is_present() && !before.contains(&entry.tag_id))
            .map(|entry| entry.object_name.clone())
            .collect()
    }

    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_present()).count()
    }

    pub fn missing_count(&self) -> usize {
        self.entries.len() - self.present_count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn classify(accumulated: &AccumulatedDetectionSet, assignments: &Assignments) -> PresenceReport {
    let entries = assignments
        .iter()
        .map(|assignment| PresenceEntry {
            tag_id: assignment.tag_id.clone(),
            object_name: assignment.object_name.clone(),
            status: if accumulated.contains(&assignment.tag_id) {
                PresenceStatus::Present
            } else {
                PresenceStatus::Missing
            },
        })
        .collect();

    PresenceReport { entries }
}

/// Accumulated tags that have no assignment, in first-seen order.
pub fn unassigned(accumulated: &AccumulatedDetectionSet, assignments: &Assignments) -> Vec<TagId> {
    accumulated
        .iter()
        .filter(|tag| !assignments.contains_tag(tag))
        .cloned()
        .collect()
}
