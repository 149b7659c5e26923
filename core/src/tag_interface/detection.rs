use crate::tag_interface::tag_id::{normalize, TagId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// De-duplicated result of one poll of the radio.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    /// Normalized identifiers in first-seen order.
    pub tags: Vec<TagId>,
    /// Number of raw identifiers reported, duplicates included.
    pub raw_count: usize,
}

impl DetectionSnapshot {
    pub fn from_raw<S: AsRef<str>>(raw_ids: &[S]) -> Self {
        let mut seen = HashSet::with_capacity(raw_ids.len());
        let mut tags = Vec::with_capacity(raw_ids.len());
        for raw in raw_ids {
            let id = normalize(raw.as_ref());
            if seen.insert(id.clone()) {
                tags.push(id);
            }
        }

        Self {
            tags,
            raw_count: raw_ids.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, tag: &TagId) -> bool {
        self.tags.contains(tag)
    }
}

/// Running union of every snapshot in the current session.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedDetectionSet {
    order: Vec<TagId>,
    seen: HashSet<TagId>,
}

impl AccumulatedDetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a snapshot and returns the identifiers that were not seen before.
    pub fn merge(&mut self, snapshot: &DetectionSnapshot) -> Vec<TagId> {
        let mut added = Vec::new();
        for tag in &snapshot.tags {
            if self.seen.insert(tag.clone()) {
                self.order.push(tag.clone());
                added.push(tag.clone());
            }
        }
        added
    }

    pub fn contains(&self, tag: &TagId) -> bool {
        self.seen.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    pub fn to_vec(&self) -> Vec<TagId> {
        self.order.clone()
    }
}

impl<'a> FromIterator<&'a str> for AccumulatedDetectionSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let raw: Vec<&str> = iter.into_iter().collect();
        let mut set = Self::new();
        set.merge(&DetectionSnapshot::from_raw(&raw));
        set
    }
}
