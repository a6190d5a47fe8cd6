use std::env;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub port: u16,
    pub baud: u32,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Explicit serial address; set to skip discovery and fallback cycling.
    pub serial_address: Option<String>,
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("SATCHEL_BRIDGE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            baud: env::var("SATCHEL_SERIAL_BAUD")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(crate::link::SERIAL_BAUD),
            reconnect_delay_ms: env::var("SATCHEL_RECONNECT_DELAY_MS")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(3000),
            max_reconnect_attempts: env::var("SATCHEL_MAX_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|a| a.parse().ok())
                .unwrap_or(10),
            serial_address: env::var("SATCHEL_SERIAL_PORT")
                .ok()
                .filter(|value| !value.trim().is_empty()),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            baud: crate::link::SERIAL_BAUD,
            reconnect_delay_ms: 3000,
            max_reconnect_attempts: 10,
            serial_address: None,
        }
    }
}
