//! HTTP front door for the WhatsApp webhook and the CRM debug surface.

mod handlers;
mod state;
mod verify;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::sink::{build_sink, RecordSink};
use crate::BoxError;

pub use state::GatewayState;

use handlers::{health, ingest_whatsapp, list_crm_records, send_message, verify_whatsapp_webhook};

pub fn build_router(state: Arc<GatewayState>) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_whatsapp_webhook).post(ingest_whatsapp))
        .route("/crm/records", get(list_crm_records))
        .route("/send-message", post(send_message))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_gateway(
    config: GatewayConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let client = reqwest::Client::new();
    let sink = build_sink(&config.sink, client.clone())?;

    if config.verify_token.is_none() {
        warn!("WHATSAPP_VERIFY_TOKEN not set; webhook verification will always fail");
    }
    if config.records_endpoint_enabled {
        warn!("/crm/records debug endpoint is enabled; do not expose it publicly");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        "webhook gateway sink={} range={} verify_token={}",
        sink.backend(),
        config.sink.range,
        if config.verify_token.is_some() { "***" } else { "unset" }
    );

    let state = Arc::new(GatewayState::new(config, sink, client));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("webhook gateway listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
