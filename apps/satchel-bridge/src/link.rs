use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serialport::SerialPort;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// Baud rate the firmware speaks.
pub const SERIAL_BAUD: u32 = 9600;

/// Read timeout on the blocking reader; also bounds how long a close waits.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Lifecycle of the single physical serial connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// The fixed sentinel vocabulary the firmware emits, one marker per line.
///
/// This is a closed enumeration, not an extensible protocol; anything else is
/// carried as `Unknown` and ignored by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelLine {
    Ready,
    Pressed,
    Released,
    Unknown(String),
}

impl SentinelLine {
    pub fn parse(line: &str) -> Self {
        match line {
            "Arduino ready" => Self::Ready,
            "BUTTON_PRESSED" => Self::Pressed,
            "BUTTON_RELEASED" => Self::Released,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Events a live link reports to the supervisor.
#[derive(Debug)]
pub enum LinkEvent {
    Line(SentinelLine),
    Closed { reason: String },
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to open {address}: {source}")]
    Open {
        address: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to start serial reader: {0}")]
    Spawn(String),
}

/// Seam between the reconnection supervisor and the physical transport, so
/// the retry state machine is testable without hardware.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<LinkHandle, LinkError>;
}

/// Owner of one open connection's reader thread.
///
/// At most one of these is alive at a time; the supervisor closes the
/// previous handle before opening a new port.
#[derive(Debug)]
pub struct LinkHandle {
    address: String,
    shutdown: Arc<AtomicBool>,
    reader: Option<std::thread::JoinHandle<()>>,
}

impl LinkHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stops the reader and waits for it to exit. A clean close emits no
    /// `Closed` event, so a stale link cannot re-trigger the supervisor.
    pub fn close(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }

    #[cfg(test)]
    pub(crate) fn stub(address: &str) -> Self {
        Self {
            address: address.to_string(),
            shutdown: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Opens real serial ports at the fixed firmware baud rate.
pub struct SerialConnector {
    baud: u32,
}

impl SerialConnector {
    pub fn new(baud: u32) -> Self {
        Self { baud }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(
        &self,
        address: &str,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<LinkHandle, LinkError> {
        let open_address = address.to_string();
        let baud = self.baud;
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&open_address, baud)
                .timeout(READ_TIMEOUT)
                .open()
        })
        .await
        .map_err(|err| LinkError::Spawn(err.to_string()))?
        .map_err(|source| LinkError::Open {
            address: address.to_string(),
            source,
        })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let reader_shutdown = shutdown.clone();
        let reader = std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || read_loop(port, events, reader_shutdown))
            .map_err(|err| LinkError::Spawn(err.to_string()))?;

        Ok(LinkHandle {
            address: address.to_string(),
            shutdown,
            reader: Some(reader),
        })
    }
}

/// Blocking reader: accumulates bytes, splits on newlines, and forwards one
/// parsed sentinel per line. Read timeouts keep the shutdown flag responsive.
fn read_loop(
    mut port: Box<dyn SerialPort>,
    events: mpsc::UnboundedSender<LinkEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 256];
    while !shutdown.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = pending.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if line.is_empty() {
                        continue;
                    }
                    trace!(%line, "serial line");
                    if events.send(LinkEvent::Line(SentinelLine::parse(&line))).is_err() {
                        return;
                    }
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::TimedOut
                    || err.kind() == std::io::ErrorKind::Interrupted =>
            {
                continue
            }
            Err(err) => {
                let _ = events.send(LinkEvent::Closed {
                    reason: err.to_string(),
                });
                return;
            }
        }
    }
}
