use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use satchel_proto::ButtonState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::discovery;
use crate::latch::ButtonLatch;
use crate::link::{ConnectionState, Connector, LinkEvent, LinkHandle, SentinelLine};

/// Platform defaults tried when discovery finds nothing, cycled one per
/// attempt. Heuristic only: nothing confirms the address belongs to the
/// intended device.
#[cfg(windows)]
const FALLBACK_ADDRESSES: &[&str] = &["COM3", "COM4", "COM5", "COM6"];
#[cfg(not(windows))]
const FALLBACK_ADDRESSES: &[&str] = &["/dev/ttyACM0", "/dev/ttyUSB0", "/dev/cu.usbmodem14201"];

/// Snapshot of the serial side shared with the HTTP handlers.
#[derive(Debug, Default)]
pub struct BridgeStatus {
    connected: AtomicBool,
    halted: AtomicBool,
    attempts: AtomicU32,
    port: Mutex<Option<String>>,
}

impl BridgeStatus {
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> Option<String> {
        self.port.lock().clone()
    }

    fn set_open(&self, address: &str) {
        self.connected.store(true, Ordering::SeqCst);
        *self.port.lock() = Some(address.to_string());
    }

    fn set_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn set_attempts(&self, attempts: u32) {
        self.attempts.store(attempts, Ordering::SeqCst);
    }

    fn set_halted(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }
}

/// Bounded retry budget for the serial link.
///
/// `attempts_made` resets only on a successful open, never by elapsed time.
#[derive(Debug)]
struct ReconnectBudget {
    attempts_made: u32,
    max_attempts: u32,
    delay: Duration,
}

impl ReconnectBudget {
    fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempts_made: 0,
            max_attempts,
            delay,
        }
    }

    fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// Owns the serial connection lifecycle: `Idle -> Scheduled -> Connecting ->
/// {Open | Scheduled}`, with at most one pending retry timer and a hard halt
/// once the attempt budget runs out.
pub struct Supervisor {
    connector: Arc<dyn Connector>,
    config: BridgeConfig,
    latch: Arc<ButtonLatch>,
    status: Arc<BridgeStatus>,
    budget: ReconnectBudget,
    state: ConnectionState,
    link: Option<LinkHandle>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    retry_tx: mpsc::UnboundedSender<()>,
    retry_rx: mpsc::UnboundedReceiver<()>,
    retry_timer: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: BridgeConfig,
        latch: Arc<ButtonLatch>,
        status: Arc<BridgeStatus>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let budget = ReconnectBudget::new(
            config.max_reconnect_attempts,
            Duration::from_millis(config.reconnect_delay_ms),
        );
        Self {
            connector,
            config,
            latch,
            status,
            budget,
            state: ConnectionState::Disconnected,
            link: None,
            link_tx,
            link_rx,
            retry_tx,
            retry_rx,
            retry_timer: None,
        }
    }

    pub async fn run(mut self) {
        self.try_connect().await;
        loop {
            tokio::select! {
                Some(event) = self.link_rx.recv() => self.on_link_event(event),
                Some(()) = self.retry_rx.recv() => self.try_connect().await,
                else => break,
            }
        }
    }

    async fn try_connect(&mut self) {
        if self.status.halted() {
            return;
        }
        debug!(state = ?self.state, "connect attempt starting");
        if let Some(link) = self.link.take() {
            self.state = ConnectionState::Closing;
            let _ = tokio::task::spawn_blocking(move || link.close()).await;
        }
        self.state = ConnectionState::Connecting;

        let address = self.pick_address().await;
        self.budget.attempts_made += 1;
        self.status.set_attempts(self.budget.attempts_made);
        info!(%address, attempt = self.budget.attempts_made, "opening serial port");

        match self.connector.connect(&address, self.link_tx.clone()).await {
            Ok(handle) => {
                info!(address = handle.address(), "serial link open");
                self.state = ConnectionState::Open;
                self.budget.attempts_made = 0;
                self.status.set_attempts(0);
                self.status.set_open(handle.address());
                self.link = Some(handle);
            }
            Err(err) => {
                warn!(%address, error = %err, "serial open failed");
                self.state = ConnectionState::Disconnected;
                self.status.set_disconnected();
                self.schedule_retry();
            }
        }
    }

    /// Discovery first; an explicit configured address wins; otherwise cycle
    /// the platform fallback list by attempt count.
    async fn pick_address(&self) -> String {
        if let Some(address) = &self.config.serial_address {
            return address.clone();
        }
        let candidates = tokio::task::spawn_blocking(discovery::list_candidates)
            .await
            .unwrap_or_default();
        if let Some(first) = candidates.first() {
            debug!(count = candidates.len(), "discovered candidate ports");
            return first.address.clone();
        }
        let index = (self.budget.attempts_made as usize) % FALLBACK_ADDRESSES.len();
        FALLBACK_ADDRESSES[index].to_string()
    }

    fn schedule_retry(&mut self) {
        if self.budget.exhausted() {
            self.status.set_halted();
            error!(
                attempts = self.budget.attempts_made,
                "maximum reconnect attempts reached; restart the bridge to recover"
            );
            return;
        }
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        let delay = self.budget.delay;
        info!(
            next_attempt = self.budget.attempts_made + 1,
            max_attempts = self.budget.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        let retry_tx = self.retry_tx.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = retry_tx.send(());
        }));
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Line(SentinelLine::Pressed) => {
                debug!("button pressed");
                self.latch.set(ButtonState::Pressed);
            }
            LinkEvent::Line(SentinelLine::Released) => {
                debug!("button released");
                self.latch.set(ButtonState::Released);
            }
            LinkEvent::Line(SentinelLine::Ready) => {
                info!("device reports ready");
            }
            LinkEvent::Line(SentinelLine::Unknown(line)) => {
                debug!(%line, "ignoring unrecognized serial line");
            }
            LinkEvent::Closed { reason } => {
                warn!(%reason, "serial link lost");
                self.state = ConnectionState::Disconnected;
                self.status.set_disconnected();
                self.link = None;
                self.schedule_retry();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkError;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct ScriptedConnector {
        outcomes: Mutex<VecDeque<bool>>,
        attempted: Mutex<Vec<String>>,
        last_events: Mutex<Option<mpsc::UnboundedSender<LinkEvent>>>,
    }

    impl ScriptedConnector {
        fn new(outcomes: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                attempted: Mutex::new(Vec::new()),
                last_events: Mutex::new(None),
            })
        }

        fn attempts(&self) -> usize {
            self.attempted.lock().len()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            address: &str,
            events: mpsc::UnboundedSender<LinkEvent>,
        ) -> Result<LinkHandle, LinkError> {
            self.attempted.lock().push(address.to_string());
            *self.last_events.lock() = Some(events);
            let ok = self.outcomes.lock().pop_front().unwrap_or(false);
            if ok {
                Ok(LinkHandle::stub(address))
            } else {
                Err(LinkError::Spawn("scripted failure".to_string()))
            }
        }
    }

    fn test_config(max_attempts: u32) -> BridgeConfig {
        BridgeConfig {
            max_reconnect_attempts: max_attempts,
            serial_address: Some("/dev/test0".to_string()),
            ..BridgeConfig::default()
        }
    }

    fn spawn_supervisor(
        connector: Arc<ScriptedConnector>,
        config: BridgeConfig,
    ) -> (Arc<ButtonLatch>, Arc<BridgeStatus>) {
        let latch = Arc::new(ButtonLatch::new());
        let status = Arc::new(BridgeStatus::default());
        let supervisor = Supervisor::new(connector, config, latch.clone(), status.clone());
        tokio::spawn(supervisor.run());
        (latch, status)
    }

    #[tokio::test(start_paused = true)]
    async fn failure_schedules_one_retry_after_fixed_delay() {
        let connector = ScriptedConnector::new(&[]);
        let (_latch, _status) = spawn_supervisor(connector.clone(), test_config(10));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.attempts(), 1);

        // Not yet: the retry fires at the full 3000 ms delay, not before.
        tokio::time::sleep(Duration::from_millis(2980)).await;
        assert_eq!(connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_halts_permanently() {
        let connector = ScriptedConnector::new(&[]);
        let (_latch, status) = spawn_supervisor(connector.clone(), test_config(3));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 3);
        assert!(status.halted());
        assert!(!status.connected());

        // No further retries once halted.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_attempt_count() {
        let connector = ScriptedConnector::new(&[false, false, true]);
        let (_latch, status) = spawn_supervisor(connector.clone(), test_config(10));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts(), 3);
        assert!(status.connected());
        assert_eq!(status.attempts(), 0);
        assert_eq!(status.port().as_deref(), Some("/dev/test0"));
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_triggers_reconnect_and_latch_updates() {
        let connector = ScriptedConnector::new(&[true, true]);
        let (latch, status) = spawn_supervisor(connector.clone(), test_config(10));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(status.connected());
        let events = connector
            .last_events
            .lock()
            .clone()
            .expect("events sender captured");

        events
            .send(LinkEvent::Line(SentinelLine::Pressed))
            .expect("send line");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(latch.read_and_consume(), ButtonState::Pressed);

        events
            .send(LinkEvent::Closed {
                reason: "unplugged".to_string(),
            })
            .expect("send closed");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!status.connected());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.attempts(), 2);
        assert!(status.connected());
        assert_eq!(status.attempts(), 0);
    }
}
