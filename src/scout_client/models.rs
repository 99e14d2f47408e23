//! Wire types exchanged with scout services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One candidate entry reported by a scout service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutEntry {
    pub external_id: String,
    pub received_at: DateTime<Utc>,
    /// Provider-specific body, stored as-is.
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntriesResponse {
    pub entries: Vec<ScoutEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendScoutsRequest {
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendScoutsResponse {
    pub sent: u32,
}
