use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Host (and optional port) of the push channel server
    #[serde(default = "default_host")]
    pub host: String,
    /// Path of the push channel endpoint
    #[serde(default = "default_path")]
    pub path: String,
    /// Use wss:// instead of ws://
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Base reconnect delay in milliseconds; attempt N waits N * base
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum number of reconnect attempts after an abnormal close
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0) applied on top of the linear delay
    #[serde(default)]
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer token attached to the connection URL
    pub token: Option<String>,
    /// Environment variable to read the bearer token from
    pub token_env: Option<String>,
}

fn default_host() -> String {
    "localhost:8000".to_string()
}

fn default_path() -> String {
    "/ws/applications/".to_string()
}

fn default_base_delay_ms() -> u64 {
    3000
}

fn default_max_attempts() -> u32 {
    5
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("endpoint.host", "localhost:8000")?
            .set_default("endpoint.path", "/ws/applications/")?
            .set_default("endpoint.secure", false)?
            .set_default("reconnect.base_delay_ms", 3000)?
            .set_default("reconnect.max_attempts", 5)?
            .set_default("reconnect.jitter_factor", 0.0)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // ENDPOINT_HOST, ENDPOINT_SECURE, AUTH_TOKEN, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            path: default_path(),
            secure: false,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter_factor: 0.0,
        }
    }
}
