//! Canonical CRM records produced from inbound WhatsApp text messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One normalized inbound text message, ready to hand to a record sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Derived from `(from, timestamp)`; stable across webhook redelivery.
    pub id: String,
    /// Sender phone identifier as reported by WhatsApp (no leading `+`).
    pub from: String,
    /// Display name of the first contact in the same batch.
    pub name: Option<String>,
    pub message: String,
    /// Originating timestamp, seconds since epoch, kept string-encoded.
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
    /// The untouched message descriptor, kept for audit.
    pub raw: serde_json::Value,
}

impl CanonicalRecord {
    pub fn new(
        from: String,
        name: Option<String>,
        message: String,
        timestamp: String,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            id: derive_record_id(&from, &timestamp),
            from,
            name,
            message,
            timestamp,
            created_at: Utc::now(),
            raw,
        }
    }

    pub fn to_row(&self) -> RecordRow {
        RecordRow {
            id: self.id.clone(),
            from: self.from.clone(),
            name: self.name.clone(),
            message: self.message.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// The flat tuple a sink stores: `(id, from, name, message, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: String,
    pub from: String,
    pub name: Option<String>,
    pub message: String,
    pub timestamp: String,
}

impl RecordRow {
    pub const COLUMNS: [&'static str; 5] = ["id", "from", "name", "message", "timestamp"];

    /// Cell values in column order. A missing name becomes an empty cell.
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.from.clone(),
            self.name.clone().unwrap_or_default(),
            self.message.clone(),
            self.timestamp.clone(),
        ]
    }

    /// Rebuilds a row from sheet cells. Short rows are padded; rows without
    /// an id are not records.
    pub fn from_cells(cells: &[String]) -> Option<Self> {
        let cell = |index: usize| {
            cells
                .get(index)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let id = cell(0);
        if id.is_empty() {
            return None;
        }
        let name = cell(2);
        Some(Self {
            id,
            from: cell(1),
            name: if name.is_empty() { None } else { Some(name) },
            message: cells.get(3).cloned().unwrap_or_default(),
            timestamp: cell(4),
        })
    }
}

/// Hex digest over sender and originating timestamp, truncated to 32 chars.
pub fn derive_record_id(from: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("wa-{}", &digest[..32])
}
