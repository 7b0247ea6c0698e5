//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub http: HttpConfig,
    pub gateway: Option<GatewayConfig>,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    /// Command sentinel: messages starting with this are commands.
    pub prefix: String,
    /// Channel link advertised in the ping reply.
    pub channel_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

/// Connection to the external messaging gateway. When absent the bot runs
/// against the console client (dev mode).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    pub api_url: String,
    pub api_key: String,
    pub instance: String,
    /// URL the gateway posts webhook events to; must resolve to this
    /// process's /webhook route.
    pub webhook_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    pub reconnect_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "wabot".to_string(),
                prefix: ".".to_string(),
                channel_url: "https://whatsapp.com/channel/0029Vb71mgIElaglZCU0je0x"
                    .to_string(),
            },
            http: HttpConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            gateway: None,
            session: SessionConfig {
                reconnect_delay_secs: 5,
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(url) = std::env::var("GATEWAY_API_URL") {
            config.gateway = Some(GatewayConfig {
                api_url: url,
                api_key: std::env::var("GATEWAY_API_KEY").unwrap_or_default(),
                instance: std::env::var("GATEWAY_INSTANCE")
                    .unwrap_or_else(|_| "wabot".to_string()),
                webhook_url: std::env::var("GATEWAY_WEBHOOK_URL").unwrap_or_else(|_| {
                    format!("http://127.0.0.1:{}/webhook", config.http.port)
                }),
            });
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            config.bot.prefix = prefix;
        }

        if let Ok(port) = std::env::var("HTTP_PORT") {
            if let Ok(port) = port.parse() {
                config.http.port = port;
            }
        }

        config
    }
}
