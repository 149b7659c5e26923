use crate::prelude::ReconResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Tag memory banks addressed by read/write operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemoryBank {
    Reserved,
    Epc,
    Tid,
    User,
}

impl MemoryBank {
    pub fn index(self) -> u8 {
        match self {
            MemoryBank::Reserved => 0,
            MemoryBank::Epc => 1,
            MemoryBank::Tid => 2,
            MemoryBank::User => 3,
        }
    }
}

/// Addresses a word range on one tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDataRequest {
    pub epc_hex: String,
    pub password_hex: String,
    pub bank: MemoryBank,
    pub offset: usize,
    pub length: usize,
}

/// Capability set of the handheld UHF radio.
///
/// Command methods return the driver's status message. Every method is an
/// await point; implementations must not block the runtime.
#[async_trait]
pub trait RadioInterface: Send + Sync {
    async fn open(&self) -> ReconResult<String>;
    async fn close(&self) -> ReconResult<String>;
    async fn is_open(&self) -> bool;

    async fn start_scan(&self) -> ReconResult<String>;
    async fn stop_scan(&self) -> ReconResult<String>;
    /// Raw, possibly zero-padded hex identifiers seen since the scan started.
    async fn detected_tag_ids(&self) -> ReconResult<Vec<String>>;
    async fn detected_tag_count(&self) -> ReconResult<u64>;

    async fn firmware_version(&self) -> ReconResult<String>;
    async fn temperature(&self) -> ReconResult<i32>;
    async fn power(&self) -> ReconResult<u8>;
    async fn set_power(&self, dbm: u8) -> ReconResult<String>;
    async fn region(&self) -> ReconResult<String>;
    async fn set_region(&self, region: &str) -> ReconResult<String>;

    /// Single inventory round; returns the raw identifier of one tag.
    async fn inventory_once(&self, timeout_ms: u64) -> ReconResult<String>;
    async fn read_tag_data(&self, request: &TagDataRequest) -> ReconResult<String>;
    async fn write_tag_data(&self, request: &TagDataRequest, data_hex: &str)
        -> ReconResult<String>;
}
