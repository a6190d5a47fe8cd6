use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub gateway_url: String,
    pub bridge_url: String,
    /// Provider endpoint the SDP offer is POSTed to.
    pub realtime_url: String,
    pub model: String,
    pub request_timeout: Duration,
    /// Pre-supplied activation code; skips the first prompt when set.
    pub activation_code: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let request_timeout_secs = env::var("SATCHEL_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(15);
        Self {
            gateway_url: env::var("SATCHEL_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            bridge_url: env::var("SATCHEL_BRIDGE_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            realtime_url: env::var("SATCHEL_REALTIME_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/realtime".to_string()),
            model: env::var("SATCHEL_REALTIME_MODEL")
                .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            activation_code: env::var("SATCHEL_ACTIVATION_CODE")
                .ok()
                .filter(|code| !code.trim().is_empty()),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:3000".to_string(),
            bridge_url: "http://localhost:3001".to_string(),
            realtime_url: "https://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-realtime-preview".to_string(),
            request_timeout: Duration::from_secs(15),
            activation_code: None,
        }
    }
}
