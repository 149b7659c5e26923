use crate::prelude::{ReconError, ReconResult, DEFAULT_STORE_KEY};
use crate::store::assignments::Assignments;
use crate::store::name_store::NameStore;
use crate::tag_interface::tag_id::TagId;
use crate::telemetry::log::LogManager;
use std::sync::Arc;

/// Loads and saves the assignment table as one JSON document under a fixed key.
#[derive(Clone)]
pub struct NameStoreAdapter {
    store: Arc<dyn NameStore>,
    key: String,
    logger: LogManager,
}

impl NameStoreAdapter {
    pub fn new(store: Arc<dyn NameStore>) -> Self {
        Self::with_key(store, DEFAULT_STORE_KEY)
    }

    pub fn with_key(store: Arc<dyn NameStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
            logger: LogManager::for_component("name_store"),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn try_load_assignments(&self) -> ReconResult<Assignments> {
        match self.store.get(&self.key).await? {
            None => Ok(Assignments::new()),
            Some(document) => serde_json::from_str(&document)
                .map_err(|err| ReconError::StoreRead(format!("decoding {}: {}", self.key, err))),
        }
    }

    /// Falls back to an empty table when the document is unreadable.
    pub async fn load_assignments(&self) -> Assignments {
        match self.try_load_assignments().await {
            Ok(assignments) => assignments,
            Err(err) => {
                self.logger
                    .warn(&format!("using empty assignment table: {}", err));
                Assignments::new()
            }
        }
    }

    pub async fn save_assignments(&self, assignments: &Assignments) -> ReconResult<()> {
        let document = serde_json::to_string(assignments)
            .map_err(|err| ReconError::StoreWrite(format!("encoding {}: {}", self.key, err)))?;
        self.store.set(&self.key, &document).await.map_err(|err| {
            self.logger.warn(&format!("save failed: {}", err));
            match err {
                ReconError::StoreWrite(_) => err,
                other => ReconError::StoreWrite(other.to_string()),
            }
        })?;
        self.logger
            .record(&format!("saved {} assignments", assignments.len()));
        Ok(())
    }
}

pub fn set_assignment(mapping: &Assignments, tag: &TagId, object_name: &str) -> Assignments {
    let mut next = mapping.clone();
    next.insert(tag.clone(), object_name.to_string());
    next
}

/// Removes the first entry, in insertion order, named `object_name`.
pub fn remove_assignment_by_name(
    mapping: &Assignments,
    object_name: &str,
) -> (Assignments, Option<TagId>) {
    let mut next = mapping.clone();
    let removed = next.find_by_name(object_name).cloned();
    if let Some(tag) = &removed {
        next.remove(tag);
    }
    (next, removed)
}
