#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::{json, Value};

use webhook_module::{
    build_router, CanonicalRecord, GatewayConfig, GatewayState, InMemoryRecordSink, RecordSink,
};

pub const VERIFY_TOKEN: &str = "verify-token-for-tests";

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        verify_token: Some(VERIFY_TOKEN.to_string()),
        records_endpoint_enabled: true,
        ..GatewayConfig::default()
    }
}

pub fn router_with_sink(config: GatewayConfig, sink: Arc<dyn RecordSink>) -> Router {
    let state = Arc::new(GatewayState::new(config, sink, reqwest::Client::new()));
    build_router(state)
}

pub fn memory_router() -> (Router, Arc<InMemoryRecordSink>) {
    let sink = Arc::new(InMemoryRecordSink::new());
    (router_with_sink(test_config(), sink.clone()), sink)
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("body should be json")
}

/// Records are appended after the response; poll until they land.
pub async fn wait_for_records(sink: &InMemoryRecordSink, expected: usize) -> Vec<CanonicalRecord> {
    for _ in 0..200 {
        let records = sink.records().await;
        if records.len() >= expected {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.records().await
}

pub fn text_message(from: &str, timestamp: &str, body: &str) -> Value {
    json!({
        "id": format!("wamid.{}.{}", from, timestamp),
        "from": from,
        "timestamp": timestamp,
        "type": "text",
        "text": { "body": body }
    })
}

pub fn image_message(from: &str, timestamp: &str) -> Value {
    json!({
        "id": format!("wamid.img.{}", timestamp),
        "from": from,
        "timestamp": timestamp,
        "type": "image",
        "image": { "id": "media-42", "mime_type": "image/jpeg", "sha256": "abc" }
    })
}

/// One entry per value, each with a single change.
pub fn envelope(values: Vec<Value>) -> Value {
    let entries: Vec<Value> = values
        .into_iter()
        .map(|value| {
            json!({
                "id": "102290129340398",
                "changes": [{ "value": value, "field": "messages" }]
            })
        })
        .collect();
    json!({ "object": "whatsapp_business_account", "entry": entries })
}

pub fn messages_value(contact_name: Option<&str>, messages: Vec<Value>) -> Value {
    let contacts: Vec<Value> = contact_name
        .map(|name| vec![json!({ "wa_id": "15550001234", "profile": { "name": name } })])
        .unwrap_or_default();
    json!({
        "messaging_product": "whatsapp",
        "metadata": { "display_phone_number": "15551230000", "phone_number_id": "106540352242922" },
        "contacts": contacts,
        "messages": messages
    })
}
