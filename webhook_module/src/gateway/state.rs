use std::sync::Arc;

use crate::adapters::{WhatsAppInboundAdapter, WhatsAppOutboundAdapter};
use crate::config::GatewayConfig;
use crate::sink::{ForwardQueue, RecordSink, SinkForwarder};

/// Read-only after startup; shared by every request.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub inbound: WhatsAppInboundAdapter,
    pub forwarder: SinkForwarder,
    /// Ordered lane into `forwarder` used by webhook ingestion.
    pub queue: ForwardQueue,
    /// Present only when both the access token and phone number id are set.
    pub outbound: Option<WhatsAppOutboundAdapter>,
}

impl GatewayState {
    /// Spawns the forwarding worker, so it must run inside a tokio runtime.
    pub fn new(config: GatewayConfig, sink: Arc<dyn RecordSink>, client: reqwest::Client) -> Self {
        let forwarder = SinkForwarder::new(sink, config.sink.timeout);
        let outbound = match (
            config.whatsapp.access_token.clone(),
            config.whatsapp.phone_number_id.clone(),
        ) {
            (Some(access_token), Some(phone_number_id)) => Some(WhatsAppOutboundAdapter::new(
                client,
                &config.whatsapp.api_base_url,
                &config.whatsapp.api_version,
                access_token,
                phone_number_id,
            )),
            _ => None,
        };
        let queue = ForwardQueue::spawn(forwarder.clone());
        Self {
            config: Arc::new(config),
            inbound: WhatsAppInboundAdapter::new(),
            forwarder,
            queue,
            outbound,
        }
    }
}
