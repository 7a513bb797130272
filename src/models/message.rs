//! Wire payload exchanged between client and server

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};

/// JSON text frame carried in both directions.
///
/// The server echoes every field unchanged, so the client can compute the
/// round-trip time from the embedded `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Time the message was created (RFC 3339, UTC, nanosecond precision)
    pub timestamp: DateTime<Utc>,

    pub content: String,

    /// Snowflake ID in decimal form; set by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Message {
    pub fn new(content: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            content: content.into(),
            message_id,
        }
    }

    /// Parse a text or binary frame. Failures map to `MalformedMessage`.
    pub fn parse(payload: &[u8]) -> AppResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self)
            .map_err(|e| AppError::internal(&format!("Failed to serialize message: {}", e)))
    }

    /// Time elapsed between the embedded timestamp and `now`, or `None` when
    /// the timestamp lies in the future (wall-clock anomaly).
    pub fn rtt_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        (now - self.timestamp).to_std().ok()
    }
}

/// Server-side view of a [`Message`].
///
/// `timestamp` is validated as RFC 3339 but kept as the text the client sent,
/// so the reply carries it back byte-for-byte whatever precision or offset
/// the client used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoMessage {
    #[serde(deserialize_with = "rfc3339_text")]
    pub timestamp: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl EchoMessage {
    pub fn parse(payload: &[u8]) -> AppResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self)
            .map_err(|e| AppError::internal(&format!("Failed to serialize reply: {}", e)))
    }
}

fn rfc3339_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&text).map_err(de::Error::custom)?;
    Ok(text)
}
