use crate::prelude::{ReconError, ReconResult};
use crate::store::{remove_assignment_by_name, set_assignment, Assignments, NameStoreAdapter};
use crate::tag_interface::TagId;
use crate::telemetry::log::LogManager;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of a successful assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignOutcome {
    pub assignments: Assignments,
    /// The unassigned working set with the newly named tag removed.
    pub unassigned: Vec<TagId>,
}

/// Result of an unassignment; `removed` is `None` when no tag had that name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnassignOutcome {
    pub assignments: Assignments,
    pub removed: Option<TagId>,
}

/// Names freshly detected tags and removes names again.
///
/// Every change is a read-modify-write of the whole persisted table, held
/// under one lock shared by all clones. A failed read or save aborts the
/// change and leaves the stored table as it was.
#[derive(Clone)]
pub struct AssignmentWorkflow {
    store: NameStoreAdapter,
    write_lock: Arc<Mutex<()>>,
    logger: LogManager,
}

impl AssignmentWorkflow {
    pub fn new(store: NameStoreAdapter) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
            logger: LogManager::for_component("assignment"),
        }
    }

    pub async fn assign(
        &self,
        unassigned: &[TagId],
        tag: &TagId,
        object_name: &str,
    ) -> ReconResult<AssignOutcome> {
        let object_name = object_name.trim();
        if object_name.is_empty() {
            return Err(ReconError::InvalidAssignment(
                "object name must not be empty".into(),
            ));
        }
        if !unassigned.contains(tag) {
            return Err(ReconError::InvalidAssignment(format!(
                "tag `{}` is not in the unassigned list",
                tag
            )));
        }

        let _guard = self.write_lock.lock().await;
        let current = self.load_for_update().await?;
        let assignments = set_assignment(&current, tag, object_name);
        self.store.save_assignments(&assignments).await?;
        self.logger
            .record(&format!("assigned `{}` to tag {}", object_name, tag));

        let unassigned = unassigned
            .iter()
            .filter(|candidate| *candidate != tag)
            .cloned()
            .collect();
        Ok(AssignOutcome {
            assignments,
            unassigned,
        })
    }

    pub async fn unassign(&self, object_name: &str) -> ReconResult<UnassignOutcome> {
        let _guard = self.write_lock.lock().await;
        let current = self.load_for_update().await?;
        let (assignments, removed) = remove_assignment_by_name(&current, object_name);

        match &removed {
            Some(tag) => {
                self.store.save_assignments(&assignments).await?;
                self.logger
                    .record(&format!("unassigned `{}` from tag {}", object_name, tag));
            }
            None => self
                .logger
                .detail(&format!("no assignment named `{}`", object_name)),
        }

        Ok(UnassignOutcome {
            assignments,
            removed,
        })
    }

    pub async fn assignments(&self) -> Assignments {
        self.store.load_assignments().await
    }

    async fn load_for_update(&self) -> ReconResult<Assignments> {
        self.store.try_load_assignments().await.map_err(|err| {
            self.logger
                .warn(&format!("not touching assignment table: {}", err));
            match err {
                ReconError::StoreRead(_) => err,
                other => ReconError::StoreRead(other.to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::ReconResult;
    use crate::store::{MemoryStore, NameStore};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Memory store whose reads yield for a while before answering.
    struct SlowStore(MemoryStore);

    #[async_trait]
    impl NameStore for SlowStore {
        async fn get(&self, key: &str) -> ReconResult<Option<String>> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> ReconResult<()> {
            self.0.set(key, value).await
        }
    }

    fn workflow() -> (AssignmentWorkflow, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let adapter = NameStoreAdapter::new(store.clone());
        (AssignmentWorkflow::new(adapter), store)
    }

    fn tags(ids: &[&str]) -> Vec<TagId> {
        ids.iter().map(|id| TagId::from(*id)).collect()
    }

    #[tokio::test]
    async fn assign_then_unassign_round_trips_through_store() {
        let (workflow, _) = workflow();
        let unassigned = tags(&["AA", "BB"]);

        let outcome = workflow
            .assign(&unassigned, &TagId::from("AA"), "  Laptop ")
            .await
            .unwrap();
        assert_eq!(outcome.unassigned, tags(&["BB"]));
        assert_eq!(
            workflow.assignments().await.get(&TagId::from("AA")),
            Some("Laptop")
        );

        let removed = workflow.unassign("Laptop").await.unwrap();
        assert_eq!(removed.removed, Some(TagId::from("AA")));
        assert!(workflow.assignments().await.is_empty());
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let (workflow, store) = workflow();
        let result = workflow
            .assign(&tags(&["AA"]), &TagId::from("AA"), "   ")
            .await;

        assert!(matches!(result, Err(ReconError::InvalidAssignment(_))));
        assert!(store.raw("assignedTags").is_none());
    }

    #[tokio::test]
    async fn tag_outside_unassigned_set_is_rejected() {
        let (workflow, _) = workflow();
        let result = workflow
            .assign(&tags(&["AA"]), &TagId::from("BB"), "Keys")
            .await;
        assert!(matches!(result, Err(ReconError::InvalidAssignment(_))));
    }

    #[tokio::test]
    async fn failed_save_aborts_assignment() {
        let (workflow, store) = workflow();
        workflow
            .assign(&tags(&["AA"]), &TagId::from("AA"), "Keys")
            .await
            .unwrap();
        store.fail_writes(true);

        let result = workflow
            .assign(&tags(&["BB"]), &TagId::from("BB"), "Wallet")
            .await;
        assert!(matches!(result, Err(ReconError::StoreWrite(_))));
        assert_eq!(store.raw("assignedTags").as_deref(), Some(r#"{"AA":"Keys"}"#));
    }

    #[tokio::test]
    async fn unassign_with_shared_name_removes_first_assigned() {
        let (workflow, _) = workflow();
        let unassigned = tags(&["AA", "BB"]);
        workflow
            .assign(&unassigned, &TagId::from("AA"), "Box")
            .await
            .unwrap();
        workflow
            .assign(&unassigned, &TagId::from("BB"), "Box")
            .await
            .unwrap();

        let outcome = workflow.unassign("Box").await.unwrap();
        assert_eq!(outcome.removed, Some(TagId::from("AA")));
        assert_eq!(outcome.assignments.get(&TagId::from("BB")), Some("Box"));
    }

    #[tokio::test]
    async fn unassign_unknown_name_writes_nothing() {
        let (workflow, store) = workflow();
        let outcome = workflow.unassign("Nothing").await.unwrap();
        assert_eq!(outcome.removed, None);
        assert!(store.raw("assignedTags").is_none());
    }

    #[tokio::test]
    async fn unreadable_table_aborts_assignment_without_writing() {
        let store = Arc::new(MemoryStore::with_value(
            "assignedTags",
            r#"{"AA":"Keys","BB":"Wallet"}"#,
        ));
        let workflow = AssignmentWorkflow::new(NameStoreAdapter::new(store.clone()));
        store.fail_reads(true);

        let result = workflow
            .assign(&tags(&["CC"]), &TagId::from("CC"), "Laptop")
            .await;
        assert!(matches!(result, Err(ReconError::StoreRead(_))));
        assert!(matches!(
            workflow.unassign("Keys").await,
            Err(ReconError::StoreRead(_))
        ));
        assert_eq!(
            store.raw("assignedTags").as_deref(),
            Some(r#"{"AA":"Keys","BB":"Wallet"}"#)
        );
    }

    #[tokio::test]
    async fn undecodable_table_is_left_alone() {
        let store = Arc::new(MemoryStore::with_value("assignedTags", "not json"));
        let workflow = AssignmentWorkflow::new(NameStoreAdapter::new(store.clone()));

        let result = workflow
            .assign(&tags(&["CC"]), &TagId::from("CC"), "Laptop")
            .await;
        assert!(matches!(result, Err(ReconError::StoreRead(_))));
        assert_eq!(store.raw("assignedTags").as_deref(), Some("not json"));
    }

    #[tokio::test]
    async fn concurrent_assignments_keep_both_entries() {
        let store = Arc::new(SlowStore(MemoryStore::new()));
        let workflow = AssignmentWorkflow::new(NameStoreAdapter::new(store));
        let other = workflow.clone();
        let unassigned = tags(&["AA", "BB"]);
        let aa = TagId::from("AA");
        let bb = TagId::from("BB");

        let (first, second) = tokio::join!(
            workflow.assign(&unassigned, &aa, "Keys"),
            other.assign(&unassigned, &bb, "Wallet"),
        );
        first.unwrap();
        second.unwrap();

        let stored = workflow.assignments().await;
        assert_eq!(stored.get(&TagId::from("AA")), Some("Keys"));
        assert_eq!(stored.get(&TagId::from("BB")), Some("Wallet"));
    }
}
