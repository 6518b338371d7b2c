//! Record sinks: where canonical records end up.
//!
//! The webhook path only ever talks to [`SinkForwarder`], which turns every
//! sink failure into an absent result.

mod memory;
mod sheets;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::{SinkBackend, SinkConfig};
use crate::google_auth::{GoogleAuth, GoogleAuthError};
use crate::record::{CanonicalRecord, RecordRow};

pub use memory::InMemoryRecordSink;
pub use sheets::SheetsRecordSink;

#[derive(Debug, thiserror::Error)]
pub enum RecordSinkError {
    #[error("auth error: {0}")]
    Auth(#[from] GoogleAuthError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sink rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("sink call timed out after {0:?}")]
    Timeout(Duration),
    #[error("sink config error: {0}")]
    Config(String),
}

/// What the sink reported for one appended row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppendReceipt {
    pub updated_range: Option<String>,
    pub updated_rows: u64,
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn append(&self, record: &CanonicalRecord) -> Result<AppendReceipt, RecordSinkError>;
    /// Most recent rows in append order, at most `limit` of them.
    async fn list_recent(&self, limit: usize) -> Result<Vec<RecordRow>, RecordSinkError>;
}

/// Best-effort, at-most-once delivery into a [`RecordSink`].
#[derive(Clone)]
pub struct SinkForwarder {
    sink: Arc<dyn RecordSink>,
    timeout: Duration,
}

impl SinkForwarder {
    pub fn new(sink: Arc<dyn RecordSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    pub fn sink(&self) -> &Arc<dyn RecordSink> {
        &self.sink
    }

    /// Appends one record; failures are logged and dropped.
    pub async fn forward(&self, record: &CanonicalRecord) -> Option<AppendReceipt> {
        let result = match tokio::time::timeout(self.timeout, self.sink.append(record)).await {
            Ok(result) => result,
            Err(_) => Err(RecordSinkError::Timeout(self.timeout)),
        };
        match result {
            Ok(receipt) => {
                info!(
                    "crm stored record id={} backend={} range={}",
                    record.id,
                    self.sink.backend(),
                    receipt.updated_range.as_deref().unwrap_or("-")
                );
                Some(receipt)
            }
            Err(err) => {
                error!(
                    "crm sink append failed id={} backend={}: {}",
                    record.id,
                    self.sink.backend(),
                    err
                );
                None
            }
        }
    }

    /// Forwards records one after another, preserving their order.
    pub async fn forward_all(&self, records: &[CanonicalRecord]) -> usize {
        let mut stored = 0;
        for record in records {
            if self.forward(record).await.is_some() {
                stored += 1;
            }
        }
        stored
    }
}

/// Single-lane queue in front of a [`SinkForwarder`].
///
/// One worker task drains batches in the order they were enqueued, so rows
/// reach the sink in webhook arrival order even when a sink call is slow.
#[derive(Clone)]
pub struct ForwardQueue {
    tx: mpsc::UnboundedSender<Vec<CanonicalRecord>>,
}

impl ForwardQueue {
    /// Spawns the worker; must be called inside a tokio runtime.
    pub fn spawn(forwarder: SinkForwarder) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<CanonicalRecord>>();
        tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                let stored = forwarder.forward_all(&batch).await;
                debug!("forward queue stored {}/{} records", stored, batch.len());
            }
            debug!("forward queue closed");
        });
        Self { tx }
    }

    /// Hands a batch to the worker without waiting for the sink.
    pub fn enqueue(&self, records: Vec<CanonicalRecord>) -> bool {
        match self.tx.send(records) {
            Ok(()) => true,
            Err(err) => {
                error!("forward queue closed, dropping {} records", err.0.len());
                false
            }
        }
    }
}

const SHEETS_CREDENTIAL_VARS: &str =
    "GOOGLE_SERVICE_ACCOUNT_JSON, GOOGLE_SHEETS_CREDENTIALS_PATH or GOOGLE_ACCESS_TOKEN";

/// Builds the configured sink. Missing Sheets settings are a startup error.
pub fn build_sink(
    config: &SinkConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn RecordSink>, RecordSinkError> {
    match config.backend {
        SinkBackend::Memory => Ok(Arc::new(InMemoryRecordSink::new())),
        SinkBackend::Sheets => {
            let spreadsheet_id = config.spreadsheet_id.clone().ok_or_else(|| {
                RecordSinkError::Config("GOOGLE_SHEETS_SPREADSHEET_ID is required".to_string())
            })?;
            let credentials = config.credentials.clone().ok_or_else(|| {
                RecordSinkError::Config(format!("{} is required", SHEETS_CREDENTIAL_VARS))
            })?;
            let auth = GoogleAuth::new(client.clone(), credentials);
            Ok(Arc::new(SheetsRecordSink::new(
                client,
                auth,
                &config.api_base_url,
                spreadsheet_id,
                config.range.clone(),
            )))
        }
    }
}
