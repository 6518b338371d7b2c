use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{AppendReceipt, RecordSink, RecordSinkError};
use crate::record::{CanonicalRecord, RecordRow};

/// Process-local record store. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryRecordSink {
    records: RwLock<Vec<CanonicalRecord>>,
}

impl InMemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<CanonicalRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RecordSink for InMemoryRecordSink {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, record: &CanonicalRecord) -> Result<AppendReceipt, RecordSinkError> {
        let mut records = self.records.write().await;
        records.push(record.clone());
        debug!("memory sink holds {} records", records.len());
        Ok(AppendReceipt {
            updated_range: Some(format!("memory!{}", records.len())),
            updated_rows: 1,
        })
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RecordRow>, RecordSinkError> {
        let records = self.records.read().await;
        let start = records.len().saturating_sub(limit);
        Ok(records[start..].iter().map(CanonicalRecord::to_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn list_recent_keeps_the_tail_in_order() {
        let sink = InMemoryRecordSink::new();
        for (index, text) in ["one", "two", "three"].iter().enumerate() {
            let record = CanonicalRecord::new(
                "15550002222".to_string(),
                None,
                text.to_string(),
                format!("17000000{:02}", index),
                json!({ "type": "text" }),
            );
            sink.append(&record).await.unwrap();
        }

        let rows = sink.list_recent(2).await.unwrap();
        let texts: Vec<&str> = rows.iter().map(|row| row.message.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
        assert_eq!(sink.list_recent(10).await.unwrap().len(), 3);
        assert_eq!(sink.records().await[0].raw["type"], "text");
    }
}
