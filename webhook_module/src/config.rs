//! Process-wide gateway configuration, read once at startup.
//!
//! Values come from an optional `webhook.toml` file and are overridden by
//! environment variables. Secrets are only read from the environment.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::{TemplateParameter, TemplateSettings};
use crate::google_auth::{GoogleAuthError, GoogleCredentials, ServiceAccountKey};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_WHATSAPP_API_VERSION: &str = "v18.0";
pub const DEFAULT_WHATSAPP_API_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_SHEETS_API_BASE_URL: &str = "https://sheets.googleapis.com";
pub const DEFAULT_SHEETS_RANGE: &str = "Sheet1!A:E";
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read google credentials file {path}: {source}")]
    CredentialsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("google credentials: {0}")]
    Credentials(#[from] GoogleAuthError),
}

#[derive(Debug, Deserialize, Default)]
pub struct GatewayConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub whatsapp: WhatsAppSection,
    #[serde(default)]
    pub sink: SinkSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_body_bytes: Option<usize>,
    pub crm_records_endpoint: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct WhatsAppSection {
    pub api_version: Option<String>,
    pub api_base_url: Option<String>,
    pub phone_number_id: Option<String>,
    pub recipient_override: Option<String>,
    pub template_name: Option<String>,
    pub template_language: Option<String>,
    pub template_header_image_url: Option<String>,
    /// Comma-separated `name=text` pairs for the template body.
    pub template_body_params: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SinkSection {
    pub backend: Option<String>,
    pub timeout_secs: Option<u64>,
    pub spreadsheet_id: Option<String>,
    pub range: Option<String>,
    pub api_base_url: Option<String>,
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBackend {
    Memory,
    Sheets,
}

impl FromStr for SinkBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" => Ok(Self::Memory),
            "sheets" | "google_sheets" => Ok(Self::Sheets),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub backend: SinkBackend,
    pub timeout: Duration,
    pub spreadsheet_id: Option<String>,
    pub range: String,
    pub api_base_url: String,
    pub credentials: Option<GoogleCredentials>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend: SinkBackend::Memory,
            timeout: DEFAULT_SINK_TIMEOUT,
            spreadsheet_id: None,
            range: DEFAULT_SHEETS_RANGE.to_string(),
            api_base_url: DEFAULT_SHEETS_API_BASE_URL.to_string(),
            credentials: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub api_version: String,
    pub api_base_url: String,
    /// Replaces the caller-supplied recipient of every outbound send.
    pub recipient_override: Option<String>,
    pub template: Option<TemplateSettings>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            api_version: DEFAULT_WHATSAPP_API_VERSION.to_string(),
            api_base_url: DEFAULT_WHATSAPP_API_BASE_URL.to_string(),
            recipient_override: None,
            template: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub verify_token: Option<String>,
    pub records_endpoint_enabled: bool,
    pub whatsapp: WhatsAppConfig,
    pub sink: SinkConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            verify_token: None,
            records_endpoint_enabled: false,
            whatsapp: WhatsAppConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = match resolve_config_path() {
            Some(path) => load_config_file(&path)?,
            None => GatewayConfigFile::default(),
        };
        Self::resolve(file, |key| env::var(key).ok())
    }

    /// Merges file values with `lookup` (environment) overrides.
    pub fn resolve(
        file: GatewayConfigFile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let host = var("GATEWAY_HOST")
            .or(file.server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT")
            .or_else(|| var("GATEWAY_PORT"))
            .and_then(|value| value.parse::<u16>().ok())
            .or(file.server.port)
            .unwrap_or(DEFAULT_PORT);
        let max_body_bytes = var("GATEWAY_MAX_BODY_BYTES")
            .and_then(|value| value.parse::<usize>().ok())
            .or(file.server.max_body_bytes)
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);
        let records_endpoint_enabled = var("CRM_RECORDS_ENDPOINT_ENABLED")
            .map(|value| parse_flag(&value))
            .or(file.server.crm_records_endpoint)
            .unwrap_or(false);

        let whatsapp_file = file.whatsapp;
        let body_parameters = match var("WHATSAPP_TEMPLATE_BODY_PARAMS")
            .or(whatsapp_file.template_body_params)
        {
            Some(raw) => parse_template_parameters(&raw)?,
            None => Vec::new(),
        };
        let template = var("WHATSAPP_TEMPLATE_NAME")
            .or(whatsapp_file.template_name)
            .map(|name| TemplateSettings {
                name,
                language: var("WHATSAPP_TEMPLATE_LANGUAGE")
                    .or(whatsapp_file.template_language)
                    .unwrap_or_else(|| "en".to_string()),
                header_image_url: var("WHATSAPP_TEMPLATE_HEADER_IMAGE_URL")
                    .or(whatsapp_file.template_header_image_url),
                body_parameters,
            });
        let whatsapp = WhatsAppConfig {
            access_token: var("WHATSAPP_ACCESS_TOKEN"),
            phone_number_id: var("WHATSAPP_PHONE_NUMBER_ID").or(whatsapp_file.phone_number_id),
            api_version: var("WHATSAPP_API_VERSION")
                .or(whatsapp_file.api_version)
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_VERSION.to_string()),
            api_base_url: var("WHATSAPP_API_BASE_URL")
                .or(whatsapp_file.api_base_url)
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE_URL.to_string()),
            recipient_override: var("WHATSAPP_RECIPIENT_OVERRIDE")
                .or(whatsapp_file.recipient_override),
            template,
        };

        let sink_file = file.sink;
        let backend_name = var("RECORD_SINK_BACKEND")
            .or(sink_file.backend)
            .unwrap_or_else(|| "memory".to_string());
        let backend = backend_name
            .parse::<SinkBackend>()
            .map_err(|value| ConfigError::InvalidValue {
                key: "RECORD_SINK_BACKEND",
                value,
            })?;
        let timeout = var("RECORD_SINK_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(sink_file.timeout_secs)
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SINK_TIMEOUT);
        let credentials = if backend == SinkBackend::Sheets {
            let credentials_path = var("GOOGLE_SHEETS_CREDENTIALS_PATH")
                .map(PathBuf::from)
                .or(sink_file.credentials_path);
            resolve_credentials(
                var("GOOGLE_SERVICE_ACCOUNT_JSON"),
                credentials_path.as_deref(),
                var("GOOGLE_ACCESS_TOKEN"),
            )?
        } else {
            None
        };
        let sink = SinkConfig {
            backend,
            timeout,
            spreadsheet_id: var("GOOGLE_SHEETS_SPREADSHEET_ID").or(sink_file.spreadsheet_id),
            range: var("GOOGLE_SHEETS_RANGE")
                .or(sink_file.range)
                .unwrap_or_else(|| DEFAULT_SHEETS_RANGE.to_string()),
            api_base_url: var("GOOGLE_SHEETS_API_BASE_URL")
                .or(sink_file.api_base_url)
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE_URL.to_string()),
            credentials,
        };

        Ok(Self {
            host,
            port,
            max_body_bytes,
            verify_token: var("WHATSAPP_VERIFY_TOKEN"),
            records_endpoint_enabled,
            whatsapp,
            sink,
        })
    }
}

/// One resolution strategy for the service-account credential: an inline
/// JSON blob wins over a key file, and a pre-issued token comes last.
pub fn resolve_credentials(
    inline_json: Option<String>,
    credentials_path: Option<&Path>,
    access_token: Option<String>,
) -> Result<Option<GoogleCredentials>, ConfigError> {
    let json = match (inline_json, credentials_path) {
        (Some(json), _) => Some(json),
        (None, Some(path)) => Some(std::fs::read_to_string(path).map_err(|source| {
            ConfigError::CredentialsFile {
                path: path.to_path_buf(),
                source,
            }
        })?),
        (None, None) => None,
    };
    if let Some(json) = json {
        let key = ServiceAccountKey::from_json(&json)?;
        return Ok(Some(GoogleCredentials::ServiceAccount(key)));
    }
    Ok(access_token.map(GoogleCredentials::AccessToken))
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("WEBHOOK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let cwd = env::current_dir().ok()?;
    let direct = cwd.join("webhook.toml");
    direct.exists().then_some(direct)
}

pub fn load_config_file(path: &Path) -> Result<GatewayConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str::<GatewayConfigFile>(&content)?)
}

/// Parses `name=Sanjay,city=Pune` into named body parameters.
fn parse_template_parameters(raw: &str) -> Result<Vec<TemplateParameter>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, text)) if !name.trim().is_empty() => Ok(TemplateParameter {
                name: name.trim().to_string(),
                text: text.trim().to_string(),
            }),
            _ => Err(ConfigError::InvalidValue {
                key: "WHATSAPP_TEMPLATE_BODY_PARAMS",
                value: pair.to_string(),
            }),
        })
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
