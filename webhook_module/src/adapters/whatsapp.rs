//! WhatsApp adapter for inbound webhooks and outbound sends via Meta Cloud API.
//!
//! - `WhatsAppInboundAdapter`: flattens webhook envelopes into canonical records
//! - `WhatsAppOutboundAdapter`: sends text or template messages via the Graph API

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::record::CanonicalRecord;

/// The only `object` value WhatsApp Business webhooks carry.
pub const WHATSAPP_OBJECT: &str = "whatsapp_business_account";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("unrecognized webhook object: {0:?}")]
    UnrecognizedObject(Option<String>),
}

/// Result of normalizing one envelope.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<CanonicalRecord>,
    /// Messages seen but not turned into records (non-text, missing fields).
    pub skipped: usize,
}

/// Adapter for parsing WhatsApp webhook payloads.
#[derive(Debug, Clone, Default)]
pub struct WhatsAppInboundAdapter;

impl WhatsAppInboundAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Parses a raw request body. Bodies that are not JSON carry no
    /// discriminator and are rejected like any foreign payload.
    pub fn parse(&self, raw_payload: &[u8]) -> Result<NormalizedBatch, EnvelopeError> {
        let body: Value = serde_json::from_slice(raw_payload).unwrap_or(Value::Null);
        self.normalize(&body)
    }

    /// Validates the discriminator, then walks entries, changes and messages
    /// in order. Shape anomalies below the discriminator only shrink the batch.
    pub fn normalize(&self, body: &Value) -> Result<NormalizedBatch, EnvelopeError> {
        let object = body.get("object").and_then(Value::as_str);
        if object != Some(WHATSAPP_OBJECT) {
            return Err(EnvelopeError::UnrecognizedObject(object.map(str::to_string)));
        }

        let mut batch = NormalizedBatch::default();
        for entry in array_field(body, "entry") {
            for change in array_field(entry, "changes") {
                let Some(value) = change.get("value").filter(|value| value.is_object()) else {
                    debug!("whatsapp change without value object, skipping");
                    continue;
                };
                normalize_value(value, &mut batch);
            }
        }
        Ok(batch)
    }
}

fn normalize_value(value: &Value, batch: &mut NormalizedBatch) {
    // WhatsApp does not link contacts to messages one-to-one in multi-message
    // batches; the first contact names every message of this value.
    let sender_name = array_field(value, "contacts")
        .first()
        .and_then(|contact| str_at(contact, "/profile/name"))
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string);

    for raw_message in array_field(value, "messages") {
        let Some(text_body) = text_body(raw_message) else {
            info!(
                "whatsapp non-text message received (type={}), skipping CRM store",
                message_kind(raw_message)
            );
            batch.skipped += 1;
            continue;
        };

        let (Some(from), Some(timestamp)) = (
            str_at(raw_message, "/from").filter(|value| !value.is_empty()),
            str_at(raw_message, "/timestamp").filter(|value| !value.is_empty()),
        ) else {
            debug!("whatsapp text message without sender or timestamp, skipping");
            batch.skipped += 1;
            continue;
        };

        batch.records.push(CanonicalRecord::new(
            from.to_string(),
            sender_name.clone(),
            text_body.to_string(),
            timestamp.to_string(),
            raw_message.clone(),
        ));
    }
}

fn array_field<'a>(value: &'a Value, key: &str) -> Vec<&'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Text body of a text message; `None` for every other kind.
///
/// Only `type`, `text.body`, `from` and `timestamp` are read, so unexpected
/// shapes elsewhere in the descriptor never drop a message.
fn text_body(message: &Value) -> Option<&str> {
    match message.get("type") {
        None | Some(Value::Null) => {}
        Some(kind) if kind.as_str() == Some("text") => {}
        Some(_) => return None,
    }
    str_at(message, "/text/body").filter(|body| !body.is_empty())
}

fn message_kind(message: &Value) -> &str {
    str_at(message, "/type").unwrap_or("unknown")
}

// ============================================================================
// Outbound
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WhatsAppSendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("whatsapp api returned {status}")]
    Api { status: u16, body: Value },
}

/// Static template used instead of a plain text message when configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSettings {
    pub name: String,
    pub language: String,
    pub header_image_url: Option<String>,
    /// Named text parameters of the template body, in order.
    pub body_parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParameter {
    pub name: String,
    pub text: String,
}

/// Successful Graph API send.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub message_id: Option<String>,
    pub to: String,
    pub response: Value,
}

/// Adapter for sending messages via WhatsApp Cloud API.
#[derive(Debug, Clone)]
pub struct WhatsAppOutboundAdapter {
    client: reqwest::Client,
    api_base_url: String,
    api_version: String,
    access_token: String,
    phone_number_id: String,
}

impl WhatsAppOutboundAdapter {
    pub fn new(
        client: reqwest::Client,
        api_base_url: &str,
        api_version: &str,
        access_token: String,
        phone_number_id: String,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            access_token,
            phone_number_id,
        }
    }

    fn api_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.api_base_url, self.api_version, self.phone_number_id
        )
    }

    pub async fn send(
        &self,
        to: &str,
        message: &str,
        template: Option<&TemplateSettings>,
    ) -> Result<SendOutcome, WhatsAppSendError> {
        let to = normalize_phone_number(to);
        let payload = build_send_payload(&to, message, template);

        info!("whatsapp sending message to {}", to);
        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(WhatsAppSendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = body
            .pointer("/messages/0/id")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(SendOutcome {
            message_id,
            to,
            response: body,
        })
    }
}

pub fn build_send_payload(to: &str, message: &str, template: Option<&TemplateSettings>) -> Value {
    let Some(template) = template else {
        return json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "body": message }
        });
    };

    let mut components = Vec::new();
    if let Some(link) = template.header_image_url.as_deref() {
        components.push(json!({
            "type": "header",
            "parameters": [{ "type": "image", "image": { "link": link } }]
        }));
    }
    if !template.body_parameters.is_empty() {
        let parameters: Vec<Value> = template
            .body_parameters
            .iter()
            .map(|parameter| {
                json!({
                    "type": "text",
                    "parameter_name": parameter.name,
                    "text": parameter.text
                })
            })
            .collect();
        components.push(json!({ "type": "body", "parameters": parameters }));
    }

    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "template",
        "template": {
            "name": template.name,
            "language": { "code": template.language },
            "components": components
        }
    })
}

/// Keeps digits and `+`, the only characters the Graph API accepts.
pub fn normalize_phone_number(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '+')
        .collect::<String>()
}
