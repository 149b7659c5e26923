use crate::prelude::{ReconError, ReconResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Persisted string key/value document store.
#[async_trait]
pub trait NameStore: Send + Sync {
    async fn get(&self, key: &str) -> ReconResult<Option<String>>;
    /// Replaces the whole value under `key`.
    async fn set(&self, key: &str, value: &str) -> ReconResult<()>;
}

/// Process-local store with optional failure injection.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, String>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.with_state(|state| {
            state.values.insert(key.to_string(), value.to_string());
        });
        store
    }

    pub fn fail_reads(&self, fail: bool) {
        self.with_state(|state| state.fail_reads = fail);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.with_state(|state| state.fail_writes = fail);
    }

    /// Raw stored value, bypassing failure injection.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.with_state(|state| state.values.get(key).cloned())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl NameStore for MemoryStore {
    async fn get(&self, key: &str) -> ReconResult<Option<String>> {
        self.with_state(|state| {
            if state.fail_reads {
                return Err(ReconError::StoreRead("memory store read disabled".into()));
            }
            Ok(state.values.get(key).cloned())
        })
    }

    async fn set(&self, key: &str, value: &str) -> ReconResult<()> {
        self.with_state(|state| {
            if state.fail_writes {
                return Err(ReconError::StoreWrite("memory store write disabled".into()));
            }
            state.values.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }
}
