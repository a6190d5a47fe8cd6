//! Wire types shared by the satchel gateway, bridge, and client.
//!
//! Every HTTP surface in the project speaks JSON; the shapes live here so the
//! client deserializes exactly what the servers serialize.

use serde::{Deserialize, Serialize};

/// Physical button state as reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Payload for `GET /button-state` on the bridge.
///
/// Reading a `pressed` state consumes it server-side, so two back-to-back
/// polls after one press observe `pressed` then `released`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonStateResponse {
    pub state: ButtonState,
    pub arduino_connected: bool,
}

/// Request body for `POST /activate` on the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    pub activation_code: String,
}

/// Success body for `POST /activate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
}

/// Error body shared by activation rejections and bad requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateError {
    pub success: bool,
    pub error: String,
}

/// Structured error returned when the provider's session API fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamErrorBody {
    pub error: String,
    pub details: serde_json::Value,
    pub status: u16,
}

/// `GET /health` on the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub status: String,
    pub uptime: u64,
    pub timestamp: u64,
}

/// `GET /health` on the bridge, including the reconnect attempt count so an
/// operator can tell a halted bridge from a healthy one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeHealth {
    pub status: String,
    pub arduino: String,
    pub uptime_seconds: u64,
    pub reconnect_attempts: u32,
}

/// `GET /test` on the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeTestStatus {
    pub status: String,
    pub arduino: String,
    pub port: String,
}

/// `GET /version` on the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub name: String,
    pub description: String,
}
