//! Microphone capture and speaker playback.
//!
//! cpal streams are not `Send`, so each direction runs on a dedicated OS
//! thread that owns its stream for its whole lifetime. Capture hands fixed
//! 20 ms frames to the session over a channel; playback receives decoded
//! samples and feeds them to the output callback through a shared queue.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// PCMU is 8 kHz mono; one frame is 20 ms.
pub const SAMPLE_RATE: u32 = 8_000;
pub const FRAME_SAMPLES: usize = 160;
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("no audio input device available")]
    NoDevice,
    #[error("audio stream failed: {0}")]
    Stream(String),
}

/// Keeps the capture thread alive; dropping or stopping it tears the
/// stream down.
pub struct CaptureHandle {
    stop: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn stop(mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop.take();
    }
}

/// Opens the default input device and starts delivering 160-sample frames.
///
/// Blocks until the capture thread reports whether the stream came up, so
/// a missing device or a denied microphone surfaces here rather than as a
/// silent session.
pub fn start_capture() -> Result<(CaptureHandle, mpsc::UnboundedReceiver<Vec<i16>>), MediaError> {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = std_mpsc::channel();
    let (ready_tx, ready_rx) = std_mpsc::channel();

    let thread = std::thread::Builder::new()
        .name("mic-capture".to_string())
        .spawn(move || capture_thread(frame_tx, stop_rx, ready_tx))
        .map_err(|err| MediaError::Stream(err.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((
            CaptureHandle {
                stop: Some(stop_tx),
                thread: Some(thread),
            },
            frame_rx,
        )),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(_) => {
            let _ = thread.join();
            Err(MediaError::Stream("capture thread exited early".to_string()))
        }
    }
}

fn capture_thread(
    frames: mpsc::UnboundedSender<Vec<i16>>,
    stop: std_mpsc::Receiver<()>,
    ready: std_mpsc::Sender<Result<(), MediaError>>,
) {
    let Some(device) = cpal::default_host().default_input_device() else {
        let _ = ready.send(Err(MediaError::NoDevice));
        return;
    };
    let config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: BufferSize::Default,
    };

    let mut pending: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES * 2);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _| {
            for &sample in data {
                pending.push((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16);
            }
            while pending.len() >= FRAME_SAMPLES {
                let frame: Vec<i16> = pending.drain(..FRAME_SAMPLES).collect();
                if frames.send(frame).is_err() {
                    return;
                }
            }
        },
        |err| warn!(error = %err, "input stream error"),
        None,
    );
    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(MediaError::Stream(err.to_string())));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = ready.send(Err(MediaError::Stream(err.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    // Parked until the handle stops or drops.
    let _ = stop.recv();
    drop(stream);
    debug!("capture thread finished");
}

/// Speaker output. Playback is best-effort: when no output device exists
/// the handle silently discards samples instead of failing the session.
pub struct PlaybackHandle {
    tx: Option<std_mpsc::Sender<Vec<i16>>>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    fn discarding() -> Self {
        Self {
            tx: None,
            thread: None,
        }
    }

    /// Clonable feed for remote-track drain tasks; `None` when discarding.
    pub fn sender(&self) -> Option<std_mpsc::Sender<Vec<i16>>> {
        self.tx.clone()
    }

    pub fn stop(mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.tx.take();
    }
}

pub fn start_playback() -> PlaybackHandle {
    let (tx, rx) = std_mpsc::channel::<Vec<i16>>();
    let (ready_tx, ready_rx) = std_mpsc::channel();

    let thread = std::thread::Builder::new()
        .name("speaker-playback".to_string())
        .spawn(move || playback_thread(rx, ready_tx));
    let thread = match thread {
        Ok(thread) => thread,
        Err(err) => {
            warn!(error = %err, "could not spawn playback thread; audio will be discarded");
            return PlaybackHandle::discarding();
        }
    };

    match ready_rx.recv() {
        Ok(Ok(())) => PlaybackHandle {
            tx: Some(tx),
            thread: Some(thread),
        },
        Ok(Err(err)) => {
            warn!(error = %err, "speaker unavailable; audio will be discarded");
            let _ = thread.join();
            PlaybackHandle::discarding()
        }
        Err(_) => {
            let _ = thread.join();
            PlaybackHandle::discarding()
        }
    }
}

fn playback_thread(
    rx: std_mpsc::Receiver<Vec<i16>>,
    ready: std_mpsc::Sender<Result<(), MediaError>>,
) {
    let Some(device) = cpal::default_host().default_output_device() else {
        let _ = ready.send(Err(MediaError::NoDevice));
        return;
    };
    let config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: BufferSize::Default,
    };

    let queue: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
    let callback_queue = Arc::clone(&queue);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _| {
            let mut queue = callback_queue.lock();
            for slot in data.iter_mut() {
                *slot = match queue.pop_front() {
                    Some(sample) => f32::from(sample) / f32::from(i16::MAX),
                    None => 0.0,
                };
            }
        },
        |err| warn!(error = %err, "output stream error"),
        None,
    );
    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(MediaError::Stream(err.to_string())));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = ready.send(Err(MediaError::Stream(err.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    // Runs until every sender is gone, then lets the stream drop.
    while let Ok(samples) = rx.recv() {
        queue.lock().extend(samples);
    }
    debug!("playback thread finished");
}
