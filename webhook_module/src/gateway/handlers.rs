use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::adapters::WhatsAppSendError;
use crate::sink::RecordSink;

use super::state::GatewayState;
use super::verify::{mask_token, verify_whatsapp_subscription};

const DEFAULT_RECORDS_LIMIT: usize = 100;
const MAX_RECORDS_LIMIT: usize = 1000;

pub(crate) async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() })),
    )
}

/// Query parameters for WhatsApp webhook verification
#[derive(Debug, Deserialize)]
pub(crate) struct WhatsAppVerifyParams {
    #[serde(rename = "hub.mode")]
    pub hub_mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub hub_verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub hub_challenge: Option<String>,
}

/// Handle WhatsApp webhook verification (GET request)
pub(crate) async fn verify_whatsapp_webhook(
    State(state): State<Arc<GatewayState>>,
    params: Result<Query<WhatsAppVerifyParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            warn!(
                "whatsapp webhook verification failed: malformed query: {}",
                rejection
            );
            return (StatusCode::FORBIDDEN, String::new());
        }
    };
    match verify_whatsapp_subscription(
        params.hub_mode.as_deref(),
        params.hub_verify_token.as_deref(),
        params.hub_challenge.as_deref(),
        state.config.verify_token.as_deref(),
    ) {
        Ok(challenge) => {
            info!("whatsapp webhook verification successful");
            (StatusCode::OK, challenge)
        }
        Err(reason) => {
            warn!(
                "whatsapp webhook verification failed: {} mode={:?} token={}",
                reason,
                params.hub_mode,
                mask_token(params.hub_verify_token.as_deref())
            );
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

/// Handle WhatsApp inbound messages (POST request).
///
/// Answers as soon as the envelope is normalized; records are appended to the
/// sink afterwards by the forwarding queue, in arrival order.
pub(crate) async fn ingest_whatsapp(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> StatusCode {
    debug!("whatsapp incoming payload: {}", String::from_utf8_lossy(&body));

    let batch = match state.inbound.parse(&body) {
        Ok(batch) => batch,
        Err(err) => {
            info!("gateway rejecting webhook: {}", err);
            return StatusCode::NOT_FOUND;
        }
    };

    info!(
        "whatsapp webhook accepted records={} skipped={}",
        batch.records.len(),
        batch.skipped
    );
    if !batch.records.is_empty() {
        state.queue.enqueue(batch.records);
    }
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordsParams {
    pub limit: Option<usize>,
}

/// Debug-only listing of stored records. Do not expose publicly.
pub(crate) async fn list_crm_records(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<RecordsParams>,
) -> (StatusCode, Json<Value>) {
    if !state.config.records_endpoint_enabled {
        return (StatusCode::NOT_FOUND, Json(json!({ "status": "disabled" })));
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECORDS_LIMIT)
        .clamp(1, MAX_RECORDS_LIMIT);

    match state.forwarder.sink().list_recent(limit).await {
        Ok(rows) => (StatusCode::OK, Json(json!(rows))),
        Err(err) => {
            error!("crm records listing failed: {}", err);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "sink_unavailable" })),
            )
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SendMessageRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Send a message through the WhatsApp Cloud API.
pub(crate) async fn send_message(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let request: SendMessageRequest = serde_json::from_slice(&body).unwrap_or_default();
    let whatsapp = &state.config.whatsapp;

    let recipient = match whatsapp.recipient_override.clone() {
        Some(fixed) => {
            info!("whatsapp recipient override active, ignoring requested recipient");
            Some(fixed)
        }
        None => request.to.filter(|value| !value.trim().is_empty()),
    };
    let message = request.message.filter(|value| !value.trim().is_empty());
    let (Some(to), Some(message)) = (recipient, message) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing required fields",
                "message": "Both 'to' (phone number) and 'message' are required"
            })),
        );
    };

    let Some(outbound) = state.outbound.as_ref() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Configuration error",
                "message": "WhatsApp API credentials not configured. Set WHATSAPP_ACCESS_TOKEN and WHATSAPP_PHONE_NUMBER_ID."
            })),
        );
    };

    match outbound.send(&to, &message, whatsapp.template.as_ref()).await {
        Ok(outcome) => {
            info!("whatsapp send succeeded message_id={:?}", outcome.message_id);
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "messageId": outcome.message_id,
                    "to": outcome.to,
                    "response": outcome.response
                })),
            )
        }
        Err(WhatsAppSendError::Api { status, body }) => {
            error!("whatsapp send failed with status {}: {}", status, body);
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(json!({ "success": false, "error": body })))
        }
        Err(err) => {
            error!("whatsapp send failed: {}", err);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "success": false, "error": { "error": err.to_string() } })),
            )
        }
    }
}
