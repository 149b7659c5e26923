use crate::prelude::{ReconError, ReconResult};
use crate::tag_interface::radio::RadioInterface;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MIN_POWER_DBM: u8 = 0;
pub const MAX_POWER_DBM: u8 = 30;

/// Point-in-time view of the reader's operating parameters.
///
/// Fields the radio failed to report are left as `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterSnapshot {
    pub firmware_version: Option<String>,
    pub temperature_c: Option<i32>,
    pub power_dbm: Option<u8>,
    pub region: Option<String>,
}

/// Pass-through access to the radio's parameter registers.
pub struct ReaderParameters {
    radio: Arc<dyn RadioInterface>,
}

impl ReaderParameters {
    pub fn new(radio: Arc<dyn RadioInterface>) -> Self {
        Self { radio }
    }

    pub async fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            firmware_version: log_failure("firmware version", self.radio.firmware_version().await),
            temperature_c: log_failure("temperature", self.radio.temperature().await),
            power_dbm: log_failure("power", self.radio.power().await),
            region: log_failure("region", self.radio.region().await),
        }
    }

    pub async fn set_power(&self, dbm: u8) -> ReconResult<String> {
        if !(MIN_POWER_DBM..=MAX_POWER_DBM).contains(&dbm) {
            return Err(ReconError::InvalidInput(format!(
                "power {} dBm outside {}-{} dBm",
                dbm, MIN_POWER_DBM, MAX_POWER_DBM
            )));
        }
        self.radio.set_power(dbm).await
    }

    pub async fn set_region(&self, region: &str) -> ReconResult<String> {
        let region = region.trim();
        if region.is_empty() {
            return Err(ReconError::InvalidInput("region must not be empty".into()));
        }
        self.radio.set_region(region).await
    }
}

fn log_failure<T>(what: &str, result: ReconResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("failed to get {}: {}", what, err);
            None
        }
    }
}
