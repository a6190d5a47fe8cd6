use std::time::Duration;

use satchel_proto::{ButtonState, ButtonStateResponse};
use tracing::trace;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls the hardware bridge for the latched button state.
///
/// The bridge is optional hardware: an unreachable or malformed response
/// is swallowed without surfacing anything to the user, and the keyboard
/// path keeps working.
pub struct ButtonPoller {
    http: reqwest::Client,
    url: String,
    last: ButtonState,
}

impl ButtonPoller {
    pub fn new(http: reqwest::Client, bridge_url: &str) -> Self {
        Self {
            http,
            url: format!("{}/button-state", bridge_url.trim_end_matches('/')),
            last: ButtonState::Released,
        }
    }

    /// One poll; returns true on a released-to-pressed edge.
    pub async fn poll_once(&mut self) -> bool {
        let response = match self
            .http
            .get(&self.url)
            .timeout(Duration::from_millis(250))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                trace!(error = %err, "bridge unreachable");
                return false;
            }
        };
        match response.json::<ButtonStateResponse>().await {
            Ok(body) => self.observe(body.state),
            Err(err) => {
                trace!(error = %err, "bridge returned a malformed body");
                false
            }
        }
    }

    fn observe(&mut self, state: ButtonState) -> bool {
        let edge = state == ButtonState::Pressed && self.last == ButtonState::Released;
        self.last = state;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poller() -> ButtonPoller {
        ButtonPoller::new(reqwest::Client::new(), "http://localhost:3001")
    }

    #[test]
    fn fires_only_on_the_rising_edge() {
        let mut poller = poller();
        assert!(poller.observe(ButtonState::Pressed));
        assert!(!poller.observe(ButtonState::Pressed));
        assert!(!poller.observe(ButtonState::Released));
        assert!(poller.observe(ButtonState::Pressed));
    }

    #[test]
    fn steady_released_never_fires() {
        let mut poller = poller();
        for _ in 0..5 {
            assert!(!poller.observe(ButtonState::Released));
        }
    }
}
