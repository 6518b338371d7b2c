//! Channel adapters for messaging platforms.

pub mod whatsapp;

pub use whatsapp::{
    build_send_payload, normalize_phone_number, EnvelopeError, NormalizedBatch, SendOutcome,
    TemplateParameter, TemplateSettings, WhatsAppInboundAdapter, WhatsAppOutboundAdapter,
    WhatsAppSendError, WHATSAPP_OBJECT,
};
