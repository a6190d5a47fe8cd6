use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::Json};
use satchel_proto::{BridgeHealth, BridgeTestStatus, ButtonStateResponse};

use crate::latch::ButtonLatch;
use crate::supervisor::BridgeStatus;

#[derive(Clone)]
pub struct BridgeState {
    pub latch: Arc<ButtonLatch>,
    pub status: Arc<BridgeStatus>,
    pub started: Instant,
}

fn arduino_label(connected: bool) -> String {
    if connected { "connected" } else { "disconnected" }.to_string()
}

/// GET /button-state - report and consume the latched button state.
pub async fn button_state(State(state): State<BridgeState>) -> Json<ButtonStateResponse> {
    Json(ButtonStateResponse {
        state: state.latch.read_and_consume(),
        arduino_connected: state.status.connected(),
    })
}

/// GET /test - quick liveness probe for the browser's startup check.
pub async fn test_status(State(state): State<BridgeState>) -> Json<BridgeTestStatus> {
    Json(BridgeTestStatus {
        status: "Bridge server is running".to_string(),
        arduino: arduino_label(state.status.connected()),
        port: state.status.port().unwrap_or_else(|| "none".to_string()),
    })
}

/// GET /health - diagnostics including the reconnect attempt count, so a
/// halted bridge is visible from the outside.
pub async fn health(State(state): State<BridgeState>) -> Json<BridgeHealth> {
    Json(BridgeHealth {
        status: if state.status.halted() { "halted" } else { "ok" }.to_string(),
        arduino: arduino_label(state.status.connected()),
        uptime_seconds: state.started.elapsed().as_secs(),
        reconnect_attempts: state.status.attempts(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_proto::ButtonState;

    fn test_state() -> BridgeState {
        BridgeState {
            latch: Arc::new(ButtonLatch::new()),
            status: Arc::new(BridgeStatus::default()),
            started: Instant::now(),
        }
    }

    #[tokio::test]
    async fn button_state_consumes_press() {
        let state = test_state();
        state.latch.set(ButtonState::Pressed);

        let Json(first) = button_state(State(state.clone())).await;
        assert_eq!(first.state, ButtonState::Pressed);

        let Json(second) = button_state(State(state)).await;
        assert_eq!(second.state, ButtonState::Released);
    }

    #[tokio::test]
    async fn health_reports_disconnected_bridge() {
        let state = test_state();
        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.arduino, "disconnected");
        assert_eq!(body.reconnect_attempts, 0);
    }
}
