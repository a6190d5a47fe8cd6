use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    /// Server-held provider secret; never leaves this process.
    pub provider_api_key: String,
    pub provider_sessions_url: String,
    pub model: String,
    pub voice: String,
    /// Explicit bound on the provider exchange instead of transport defaults.
    pub upstream_timeout: Duration,
    pub log_dir: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let upstream_timeout_secs = env::var("SATCHEL_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(15);
        Self {
            port: env::var("SATCHEL_GATEWAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            provider_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            provider_sessions_url: env::var("SATCHEL_SESSIONS_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/realtime/sessions".to_string()),
            model: env::var("SATCHEL_REALTIME_MODEL")
                .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string()),
            voice: env::var("SATCHEL_REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            log_dir: env::var("SATCHEL_LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            provider_api_key: String::new(),
            provider_sessions_url: "https://api.openai.com/v1/realtime/sessions".to_string(),
            model: "gpt-4o-realtime-preview".to_string(),
            voice: "alloy".to_string(),
            upstream_timeout: Duration::from_secs(15),
            log_dir: "logs".to_string(),
        }
    }
}
