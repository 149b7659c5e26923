use crate::prelude::{ReconError, ReconResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical tag identifier with the trailing zero padding removed.
///
/// Only [`normalize`] produces one, so two `TagId`s compare equal exactly when
/// their raw identifiers normalize to the same string. The empty identifier
/// (an all-zero EPC) is a valid key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TagId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TagId {
    fn from(raw: &str) -> Self {
        normalize(raw)
    }
}

impl From<String> for TagId {
    fn from(raw: String) -> Self {
        normalize(&raw)
    }
}

/// Strips the maximal run of trailing `'0'` characters.
pub fn normalize(raw: &str) -> TagId {
    TagId(raw.trim_end_matches('0').to_string())
}

/// Uppercase hex, two digits per byte, as the reader firmware reports EPCs.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

pub fn hex_to_bytes(hex: &str) -> ReconResult<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(ReconError::InvalidInput(format!(
            "hex string has odd length {}",
            hex.len()
        )));
    }

    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let digits = std::str::from_utf8(pair)
                .map_err(|_| ReconError::InvalidInput("hex string is not ascii".into()))?;
            u8::from_str_radix(digits, 16)
                .map_err(|_| ReconError::InvalidInput(format!("invalid hex digits `{}`", digits)))
        })
        .collect()
}
