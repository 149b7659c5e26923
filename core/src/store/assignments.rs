use crate::tag_interface::tag_id::{normalize, TagId};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One persisted tag-to-object association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameAssignment {
    pub tag_id: TagId,
    pub object_name: String,
}

/// Ordered tag → object-name mapping.
///
/// Each tag maps to at most one name. Iteration follows insertion order and
/// overwriting a tag keeps its original position. Serialized as a flat JSON
/// object keyed by the normalized tag identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignments {
    entries: Vec<NameAssignment>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &TagId) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| &entry.tag_id == tag)
            .map(|entry| entry.object_name.as_str())
    }

    pub fn contains_tag(&self, tag: &TagId) -> bool {
        self.get(tag).is_some()
    }

    /// Inserts or overwrites; returns the previous name for `tag`.
    pub fn insert(&mut self, tag: TagId, object_name: String) -> Option<String> {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.tag_id == tag) {
            return Some(std::mem::replace(&mut entry.object_name, object_name));
        }
        self.entries.push(NameAssignment {
            tag_id: tag,
            object_name,
        });
        None
    }

    pub fn remove(&mut self, tag: &TagId) -> Option<String> {
        let index = self.entries.iter().position(|entry| &entry.tag_id == tag)?;
        Some(self.entries.remove(index).object_name)
    }

    /// First tag, in insertion order, assigned to `object_name`.
    pub fn find_by_name(&self, object_name: &str) -> Option<&TagId> {
        self.entries
            .iter()
            .find(|entry| entry.object_name == object_name)
            .map(|entry| &entry.tag_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NameAssignment> {
        self.entries.iter()
    }

    pub fn tags(&self) -> impl Iterator<Item = &TagId> {
        self.entries.iter().map(|entry| &entry.tag_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Into<TagId>, N: Into<String>> FromIterator<(T, N)> for Assignments {
    fn from_iter<I: IntoIterator<Item = (T, N)>>(iter: I) -> Self {
        let mut assignments = Assignments::new();
        for (tag, name) in iter {
            assignments.insert(tag.into(), name.into());
        }
        assignments
    }
}

impl Serialize for Assignments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(entry.tag_id.as_str(), &entry.object_name)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Assignments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AssignmentsVisitor;

        impl<'de> Visitor<'de> for AssignmentsVisitor {
            type Value = Assignments;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tag identifiers to object names")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut assignments = Assignments::new();
                while let Some((tag, name)) = access.next_entry::<String, String>()? {
                    // Documents written by older builds may hold padded keys.
                    assignments.insert(normalize(&tag), name);
                }
                Ok(assignments)
            }
        }

        deserializer.deserialize_map(AssignmentsVisitor)
    }
}
