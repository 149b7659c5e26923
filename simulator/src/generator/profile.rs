use anyhow::ensure;
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rfidcore::prelude::{ReconError, ReconResult};
use rfidcore::tag_interface::tag_id::{bytes_to_hex, hex_to_bytes};
use rfidcore::tag_interface::{RadioInterface, TagDataRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Configuration for the simulated tag population and radio behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of random tags when `tags` is empty.
    pub tag_count: usize,
    /// Explicit tag identifiers; overrides `tag_count`.
    pub tags: Vec<String>,
    /// Reported EPC length in hex characters, zero padded.
    pub epc_len: usize,
    pub detection_rate: f64,
    pub duplicate_rate: f64,
    pub read_failure_rate: f64,
    pub seed: u64,
    pub firmware: String,
    pub region: String,
    pub power_dbm: u8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tag_count: 6,
            tags: Vec::new(),
            epc_len: 24,
            detection_rate: 0.7,
            duplicate_rate: 0.1,
            read_failure_rate: 0.0,
            seed: 0,
            firmware: "SIM-UHF-2.1".into(),
            region: "FCC".into(),
            power_dbm: 26,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, rate) in [
            ("detection_rate", self.detection_rate),
            ("duplicate_rate", self.duplicate_rate),
            ("read_failure_rate", self.read_failure_rate),
        ] {
            ensure!((0.0..=1.0).contains(&rate), "{} must be within 0..=1", name);
        }
        ensure!(self.epc_len > 0, "epc_len must be positive");
        Ok(())
    }
}

/// Builds the zero-padded identifiers the simulated radio reports.
pub fn build_population(config: &GeneratorConfig) -> Vec<String> {
    if !config.tags.is_empty() {
        return config
            .tags
            .iter()
            .map(|tag| pad_epc(&tag.to_uppercase(), config.epc_len))
            .collect();
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let prefix_bytes = (config.epc_len / 2).clamp(1, 6);
    (0..config.tag_count)
        .map(|_| {
            let mut bytes: Vec<u8> = (0..prefix_bytes).map(|_| rng.gen()).collect();
            // A trailing zero byte would be eaten by normalization.
            if let Some(last) = bytes.last_mut() {
                *last |= 0x01;
            }
            pad_epc(&bytes_to_hex(&bytes), config.epc_len)
        })
        .collect()
}

fn pad_epc(id: &str, epc_len: usize) -> String {
    format!("{:0<width$}", id, width = epc_len.max(id.len()))
}

/// Radio that inventories a seeded, fixed population of tags.
pub struct SimulatedRadio {
    config: GeneratorConfig,
    population: Vec<String>,
    state: Mutex<SimState>,
}

struct SimState {
    rng: StdRng,
    open: bool,
    scanning: bool,
    total_reads: u64,
    power: u8,
    region: String,
    memory: HashMap<(String, u8), Vec<u8>>,
}

impl SimulatedRadio {
    pub fn new(config: GeneratorConfig) -> Self {
        let population = build_population(&config);
        let state = SimState {
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(1)),
            open: false,
            scanning: false,
            total_reads: 0,
            power: config.power_dbm,
            region: config.region.clone(),
            memory: HashMap::new(),
        };
        Self {
            config,
            population,
            state: Mutex::new(state),
        }
    }

    pub fn population(&self) -> &[String] {
        &self.population
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn require_open(&self) -> ReconResult<()> {
        if self.with_state(|state| state.open) {
            Ok(())
        } else {
            Err(ReconError::RadioCommand("UHF module is not open".into()))
        }
    }
}

#[async_trait]
impl RadioInterface for SimulatedRadio {
    async fn open(&self) -> ReconResult<String> {
        self.with_state(|state| state.open = true);
        Ok("UHF module opened successfully".into())
    }

    async fn close(&self) -> ReconResult<String> {
        self.with_state(|state| {
            state.open = false;
            state.scanning = false;
        });
        Ok("UHF module closed successfully".into())
    }

    async fn is_open(&self) -> bool {
        self.with_state(|state| state.open)
    }

    async fn start_scan(&self) -> ReconResult<String> {
        self.require_open()
            .map_err(|_| ReconError::RadioCommand("Failed to start scanning".into()))?;
        self.with_state(|state| state.scanning = true);
        Ok("Scanning started".into())
    }

    async fn stop_scan(&self) -> ReconResult<String> {
        self.require_open()
            .map_err(|_| ReconError::RadioCommand("Failed to stop scanning".into()))?;
        self.with_state(|state| state.scanning = false);
        Ok("Scanning stopped".into())
    }

    async fn detected_tag_ids(&self) -> ReconResult<Vec<String>> {
        let config = &self.config;
        let population = &self.population;
        self.with_state(|state| {
            if !state.scanning {
                return Ok(Vec::new());
            }
            if state.rng.gen_bool(config.read_failure_rate) {
                return Err(ReconError::RadioRead("inventory buffer busy".into()));
            }

            let mut batch = Vec::new();
            for tag in population {
                if state.rng.gen_bool(config.detection_rate) {
                    batch.push(tag.clone());
                    if state.rng.gen_bool(config.duplicate_rate) {
                        batch.push(tag.clone());
                    }
                }
            }
            state.total_reads += batch.len() as u64;
            Ok(batch)
        })
    }

    async fn detected_tag_count(&self) -> ReconResult<u64> {
        Ok(self.with_state(|state| state.total_reads))
    }

    async fn firmware_version(&self) -> ReconResult<String> {
        self.require_open()?;
        Ok(self.config.firmware.clone())
    }

    async fn temperature(&self) -> ReconResult<i32> {
        self.require_open()?;
        Ok(self.with_state(|state| 28 + state.rng.gen_range(0..6)))
    }

    async fn power(&self) -> ReconResult<u8> {
        Ok(self.with_state(|state| state.power))
    }

    async fn set_power(&self, dbm: u8) -> ReconResult<String> {
        self.require_open()
            .map_err(|_| ReconError::RadioCommand("Failed to set power".into()))?;
        self.with_state(|state| state.power = dbm);
        Ok(format!("Power set to {} dBm", dbm))
    }

    async fn region(&self) -> ReconResult<String> {
        self.require_open()?;
        Ok(self.with_state(|state| state.region.clone()))
    }

    async fn set_region(&self, region: &str) -> ReconResult<String> {
        self.require_open()
            .map_err(|_| ReconError::RadioCommand("Failed to set region".into()))?;
        self.with_state(|state| state.region = region.to_string());
        Ok(format!("Region set to {}", region))
    }

    async fn inventory_once(&self, _timeout_ms: u64) -> ReconResult<String> {
        self.require_open()?;
        let population = &self.population;
        self.with_state(|state| {
            if population.is_empty() {
                return Err(ReconError::RadioRead("Failed to read tag once".into()));
            }
            let index = state.rng.gen_range(0..population.len());
            Ok(population[index].clone())
        })
    }

    async fn read_tag_data(&self, request: &TagDataRequest) -> ReconResult<String> {
        self.require_open()?;
        let key = (request.epc_hex.to_uppercase(), request.bank.index());
        let mut data = self
            .with_state(|state| state.memory.get(&key).cloned())
            .unwrap_or_default();
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
            let end = request.offset + bytes.len();
            if cell.len() < end {
                cell.resize(end, 0);
            }
            cell[request.offset..end].copy_from_slice(&bytes);
        });
        Ok("Tag data written successfully".into())
    }
}
