use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{AppendReceipt, RecordSink, RecordSinkError};
use crate::google_auth::GoogleAuth;
use crate::record::{CanonicalRecord, RecordRow};

/// Appends records as rows of a Google spreadsheet through Sheets API v4.
#[derive(Debug, Clone)]
pub struct SheetsRecordSink {
    client: reqwest::Client,
    auth: GoogleAuth,
    api_base_url: String,
    spreadsheet_id: String,
    range: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
    updated_rows: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsRecordSink {
    pub fn new(
        client: reqwest::Client,
        auth: GoogleAuth,
        api_base_url: &str,
        spreadsheet_id: String,
        range: String,
    ) -> Self {
        Self {
            client,
            auth,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            spreadsheet_id,
            range,
        }
    }

    fn values_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base_url,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&self.range)
        )
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RecordSinkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!("sheets api rejected access token, clearing cached token");
            self.auth.invalidate().await;
        }
        let body = response.text().await.unwrap_or_default();
        Err(RecordSinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RecordSink for SheetsRecordSink {
    fn backend(&self) -> &'static str {
        "sheets"
    }

    async fn append(&self, record: &CanonicalRecord) -> Result<AppendReceipt, RecordSinkError> {
        let access_token = self.auth.get_access_token().await?;
        let payload = json!({ "values": [record.to_row().to_cells()] });

        let response = self
            .client
            .post(format!("{}:append", self.values_url()))
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await?;
        let response = self.check_status(response).await?;

        let body: AppendResponse = response.json().await?;
        debug!("sheets append response: {:?}", body);
        let updates = body.updates.unwrap_or_default();
        Ok(AppendReceipt {
            updated_range: updates.updated_range,
            updated_rows: updates.updated_rows.unwrap_or(0),
        })
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RecordRow>, RecordSinkError> {
        let access_token = self.auth.get_access_token().await?;
        let response = self
            .client
            .get(self.values_url())
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = self.check_status(response).await?;

        let body: ValueRange = response.json().await?;
        let rows: Vec<RecordRow> = body
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
            .filter(|cells| {
                cells
                    .first()
                    .map(|first| !first.trim().eq_ignore_ascii_case(RecordRow::COLUMNS[0]))
                    .unwrap_or(false)
            })
            .filter_map(|cells| RecordRow::from_cells(&cells))
            .collect();
        let start = rows.len().saturating_sub(limit);
        Ok(rows[start..].to_vec())
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
