//! Deterministic in-memory radio used by tests and dry runs.

use crate::prelude::{ReconError, ReconResult};
use crate::tag_interface::radio::{RadioInterface, TagDataRequest};
use crate::tag_interface::tag_id::{bytes_to_hex, hex_to_bytes};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Replays a queue of per-poll detection batches.
///
/// Each call to `detected_tag_ids` consumes one scripted entry; once the
/// script runs dry every poll reports no tags.
pub struct ScriptedRadio {
    inner: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    open: bool,
    scanning: bool,
    polls: VecDeque<ReconResult<Vec<String>>>,
    read_delay: Option<Duration>,
    start_delay: Option<Duration>,
    fail_open: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_count: bool,
    raw_reads: u64,
    calls: CallCounts,
    power: u8,
    region: String,
    memory: HashMap<(String, u8), Vec<u8>>,
}

/// How often each command was issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub open: usize,
    pub close: usize,
    pub start_scan: usize,
    pub stop_scan: usize,
    pub reads: usize,
}

impl ScriptedRadio {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ScriptState {
                power: 20,
                region: "FCC".into(),
                ..Default::default()
            }),
        }
    }

    pub fn push_detections<S: AsRef<str>>(&self, raw_ids: &[S]) -> &Self {
        let batch = raw_ids.iter().map(|id| id.as_ref().to_string()).collect();
        self.with_state(|state| state.polls.push_back(Ok(batch)));
        self
    }

    pub fn push_read_failure(&self, message: &str) -> &Self {
        let err = ReconError::RadioRead(message.to_string());
        self.with_state(|state| state.polls.push_back(Err(err)));
        self
    }

    pub fn set_read_delay(&self, delay: Duration) -> &Self {
        self.with_state(|state| state.read_delay = Some(delay));
        self
    }

    pub fn set_start_delay(&self, delay: Duration) -> &Self {
        self.with_state(|state| state.start_delay = Some(delay));
        self
    }

    pub fn fail_open(&self, fail: bool) -> &Self {
        self.with_state(|state| state.fail_open = fail);
        self
    }

    pub fn fail_start(&self, fail: bool) -> &Self {
        self.with_state(|state| state.fail_start = fail);
        self
    }

    pub fn fail_stop(&self, fail: bool) -> &Self {
        self.with_state(|state| state.fail_stop = fail);
        self
    }

    pub fn fail_count(&self, fail: bool) -> &Self {
        self.with_state(|state| state.fail_count = fail);
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.with_state(|state| state.calls)
    }

    pub fn is_scanning(&self) -> bool {
        self.with_state(|state| state.scanning)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ScriptState) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn require_open(&self) -> ReconResult<()> {
        if self.with_state(|state| state.open) {
            Ok(())
        } else {
            Err(ReconError::RadioCommand("radio is not open".into()))
        }
    }
}

impl Default for ScriptedRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadioInterface for ScriptedRadio {
    async fn open(&self) -> ReconResult<String> {
        self.with_state(|state| {
            state.calls.open += 1;
            if state.fail_open {
                return Err(ReconError::RadioCommand("Failed to open UHF module".into()));
            }
            state.open = true;
            Ok("UHF module opened successfully".to_string())
        })
    }

    async fn close(&self) -> ReconResult<String> {
        self.with_state(|state| {
            state.calls.close += 1;
            state.open = false;
            state.scanning = false;
        });
        Ok("UHF module closed successfully".into())
    }

    async fn is_open(&self) -> bool {
        self.with_state(|state| state.open)
    }

    async fn start_scan(&self) -> ReconResult<String> {
        let delay = self.with_state(|state| state.start_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.with_state(|state| {
            state.calls.start_scan += 1;
            if state.fail_start || !state.open {
                return Err(ReconError::RadioCommand("Failed to start scanning".into()));
            }
            state.scanning = true;
            Ok("Scanning started".to_string())
        })
    }

    async fn stop_scan(&self) -> ReconResult<String> {
        self.with_state(|state| {
            state.calls.stop_scan += 1;
            if state.fail_stop {
                return Err(ReconError::RadioCommand("Failed to stop scanning".into()));
            }
            state.scanning = false;
            Ok("Scanning stopped".to_string())
        })
    }

    async fn detected_tag_ids(&self) -> ReconResult<Vec<String>> {
        let delay = self.with_state(|state| state.read_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.with_state(|state| {
            state.calls.reads += 1;
            let batch = state.polls.pop_front().unwrap_or_else(|| Ok(Vec::new()))?;
            state.raw_reads += batch.len() as u64;
            Ok(batch)
        })
    }

    async fn detected_tag_count(&self) -> ReconResult<u64> {
        self.with_state(|state| {
            if state.fail_count {
                Err(ReconError::RadioRead("tag count unavailable".into()))
            } else {
                Ok(state.raw_reads)
            }
        })
    }

    async fn firmware_version(&self) -> ReconResult<String> {
        self.require_open()?;
        Ok("SCRIPTED-1.0".into())
    }

    async fn temperature(&self) -> ReconResult<i32> {
        self.require_open()?;
        Ok(31)
    }

    async fn power(&self) -> ReconResult<u8> {
        Ok(self.with_state(|state| state.power))
    }

    async fn set_power(&self, dbm: u8) -> ReconResult<String> {
        self.require_open()?;
        self.with_state(|state| state.power = dbm);
        Ok(format!("Power set to {} dBm", dbm))
    }

    async fn region(&self) -> ReconResult<String> {
        self.require_open()?;
        Ok(self.with_state(|state| state.region.clone()))
    }

    async fn set_region(&self, region: &str) -> ReconResult<String> {
        self.require_open()?;
        self.with_state(|state| state.region = region.to_string());
        Ok(format!("Region set to {}", region))
    }

    async fn inventory_once(&self, _timeout_ms: u64) -> ReconResult<String> {
        self.require_open()?;
        self.with_state(|state| match state.polls.front() {
            Some(Ok(batch)) if !batch.is_empty() => Ok(batch[0].clone()),
            _ => Err(ReconError::RadioRead("Failed to read tag once".into())),
        })
    }

    async fn read_tag_data(&self, request: &TagDataRequest) -> ReconResult<String> {
        self.require_open()?;
        let key = (request.epc_hex.to_uppercase(), request.bank.index());
        let stored = self.with_state(|state| state.memory.get(&key).cloned());
        let mut data = stored.unwrap_or_default();
        data.resize(request.offset + request.length, 0);
        Ok(bytes_to_hex(&data[request.offset..]))
    }

    async fn write_tag_data(
        &self,
        request: &TagDataRequest,
        data_hex: &str,
    ) -> ReconResult<String> {
        self.require_open()?;
        let bytes = hex_to_bytes(data_hex)?;
        let key = (request.epc_hex.to_uppercase(), request.bank.index());
        self.with_state(|state| {
            let cell = state.memory.entry(key).or_default();
            if cell.len() < request.offset + bytes.len() {
                cell.resize(request.offset + bytes.len(), 0);
            }
            cell[request.offset..request.offset + bytes.len()].copy_from_slice(&bytes);
        });
        Ok("Tag data written successfully".into())
    }
}
