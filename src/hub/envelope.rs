//! Broadcast wire events
//!
//! Every frame pushed to clients is `{"type": <int>, "data": <payload>}`;
//! clients dispatch on `type`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::ChatRow;

/// Serialized frame shared by every recipient of one broadcast
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventType {
    ChatMessage = 1,
}

impl EventType {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: u16,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(event_type: EventType, payload: &T) -> Result<Self> {
        Ok(Self {
            event_type: event_type.code(),
            data: serde_json::to_value(payload)?,
        })
    }

    pub fn encode(&self) -> Result<Frame> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub sender_name: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl From<&ChatRow> for ChatMessage {
    fn from(row: &ChatRow) -> Self {
        Self {
            id: row.id,
            sender_name: row.sender_name.clone(),
            message: row.message.clone(),
            sent_at: row.sent_at,
        }
    }
}
