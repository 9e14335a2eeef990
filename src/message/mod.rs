use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;

/// Inbound message envelope.
///
/// Every push message carries a `type` discriminator; the remaining fields
/// form a type-specific payload owned by the consuming feature, not by the
/// client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub payload: serde_json::Value,
    #[serde(skip, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl Envelope {
    /// Parse a raw text frame into an envelope.
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        serde_json::from_str(text).map_err(|e| RealtimeError::Parse(e.to_string()))
    }
}
