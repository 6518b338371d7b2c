pub mod adapters;
pub mod config;
pub mod gateway;
pub mod google_auth;
pub mod record;
pub mod sink;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::GatewayConfig;
pub use gateway::{build_router, run_gateway, GatewayState};
pub use record::{CanonicalRecord, RecordRow};
pub use sink::{ForwardQueue, InMemoryRecordSink, RecordSink, SheetsRecordSink, SinkForwarder};
