use rfidcore::ReconError;
use serde::{Deserialize, Serialize};

/// Body of `POST /assign`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub tag: String,
    pub name: String,
}

/// Body of `POST /unassign`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnassignRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeReply {
    pub status: String,
    pub message: String,
}

impl BridgeReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".into(),
            message: message.into(),
        }
    }

    pub fn error(err: &ReconError) -> Self {
        Self {
            status: "error".into(),
            message: err.to_string(),
        }
    }
}
