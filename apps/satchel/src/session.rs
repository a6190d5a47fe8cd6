//! Realtime session lifecycle: credential fetch, peer connection setup,
//! SDP negotiation over HTTP, and total teardown.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_PCMU};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::ClientConfig;
use crate::events::{self, RealtimeEvent, UiUpdate};
use crate::g711;
use crate::media::{self, CaptureHandle, PlaybackHandle};

/// Label the provider expects for the control channel.
const EVENT_CHANNEL_LABEL: &str = "oai-events";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already active; stop it before starting another")]
    AlreadyActive,
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),
    #[error("could not fetch a session credential: {0}")]
    Credential(String),
    #[error("backend returned an unusable credential: {0}")]
    InvalidCredential(String),
    #[error("realtime negotiation failed: {0}")]
    Negotiation(String),
    #[error("transport setup failed: {0}")]
    Setup(String),
}

impl From<webrtc::Error> for SessionError {
    fn from(err: webrtc::Error) -> Self {
        SessionError::Setup(err.to_string())
    }
}

struct RealtimeSession {
    peer: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
    capture: CaptureHandle,
    playback: PlaybackHandle,
    pump: JoinHandle<()>,
    sinks: Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>>,
}

impl RealtimeSession {
    async fn teardown(self) {
        self.pump.abort();
        let sinks: Vec<_> = self.sinks.lock().drain(..).collect();
        for sink in sinks {
            sink.abort();
        }
        if let Err(err) = self.channel.close().await {
            debug!(error = %err, "event channel close failed");
        }
        if let Err(err) = self.peer.close().await {
            warn!(error = %err, "peer connection close failed");
        }
        self.capture.stop();
        self.playback.stop();
        info!("realtime session closed");
    }
}

/// Everything `establish` builds besides the capture handle, which stays
/// with the caller so it can be stopped on any failure path.
struct Established {
    peer: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
    playback: PlaybackHandle,
    pump: JoinHandle<()>,
    sinks: Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>>,
}

pub struct SessionController {
    config: ClientConfig,
    http: reqwest::Client,
    ui: mpsc::UnboundedSender<UiUpdate>,
    active: Option<RealtimeSession>,
}

impl SessionController {
    pub fn new(config: ClientConfig, ui: mpsc::UnboundedSender<UiUpdate>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            ui,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Brings up a full session: fresh credential, microphone, peer
    /// connection, negotiated answer. Refuses while one is already live.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        // Credentials are short-lived; fetch one per session, never cache.
        let credential = self.fetch_credential().await?;

        let (capture, frames) = media::start_capture()
            .map_err(|err| SessionError::PermissionDenied(err.to_string()))?;

        match self.establish(&credential, frames).await {
            Ok(parts) => {
                self.active = Some(RealtimeSession {
                    peer: parts.peer,
                    channel: parts.channel,
                    capture,
                    playback: parts.playback,
                    pump: parts.pump,
                    sinks: parts.sinks,
                });
                Ok(())
            }
            Err(err) => {
                // Partial teardown: nothing of the failed attempt survives.
                capture.stop();
                Err(err)
            }
        }
    }

    /// Idempotent: closing with no live session is a no-op.
    pub async fn close(&mut self) {
        if let Some(session) = self.active.take() {
            session.teardown().await;
        }
    }

    async fn fetch_credential(&self) -> Result<String, SessionError> {
        let url = format!("{}/session", self.config.gateway_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|err| SessionError::Credential(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Credential(format!(
                "backend returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| SessionError::Credential(err.to_string()))?;
        credential_from_body(&body)
    }

    async fn establish(
        &self,
        credential: &str,
        frames: mpsc::UnboundedReceiver<Vec<i16>>,
    ) -> Result<Established, SessionError> {
        let api = build_api()?;
        let peer = Arc::new(api.new_peer_connection(RTCConfiguration::default()).await?);
        match self.negotiate(Arc::clone(&peer), credential, frames).await {
            Ok(parts) => Ok(parts),
            Err(err) => {
                let _ = peer.close().await;
                Err(err)
            }
        }
    }

    async fn negotiate(
        &self,
        peer: Arc<RTCPeerConnection>,
        credential: &str,
        frames: mpsc::UnboundedReceiver<Vec<i16>>,
    ) -> Result<Established, SessionError> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_PCMU.to_string(),
                clock_rate: media::SAMPLE_RATE,
                channels: 1,
                ..Default::default()
            },
            "audio".to_string(),
            "satchel-mic".to_string(),
        ));
        peer.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        let playback = media::start_playback();
        let sinks: Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let sinks = Arc::clone(&sinks);
            let speaker = playback.sender();
            peer.on_track(Box::new(move |track, _receiver, _transceiver| {
                let sinks = Arc::clone(&sinks);
                let speaker = speaker.clone();
                Box::pin(async move {
                    let handle = tokio::spawn(drain_remote(track, speaker));
                    sinks.lock().push(handle);
                })
            }));
        }

        // The control channel must exist before the offer so it lands in
        // the SDP the provider answers.
        let channel = peer.create_data_channel(EVENT_CHANNEL_LABEL, None).await?;
        self.attach_event_handlers(&channel);

        let pump = tokio::spawn(pump_frames(track, frames));

        let offer = peer.create_offer(None).await?;
        let mut gather = peer.gathering_complete_promise().await;
        peer.set_local_description(offer).await?;
        let _ = gather.recv().await;
        let local = peer
            .local_description()
            .await
            .ok_or_else(|| SessionError::Setup("missing local description".to_string()))?;

        let url = format!("{}?model={}", self.config.realtime_url, self.config.model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(credential)
            .header("Content-Type", "application/sdp")
            .timeout(self.config.request_timeout)
            .body(local.sdp)
            .send()
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Negotiation(format!(
                "provider returned {}",
                response.status()
            )));
        }
        let answer_sdp = response
            .text()
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;
        let answer = RTCSessionDescription::answer(answer_sdp)?;
        peer.set_remote_description(answer).await?;

        info!("realtime session established");
        Ok(Established {
            peer,
            channel,
            playback,
            pump,
            sinks,
        })
    }

    fn attach_event_handlers(&self, channel: &Arc<RTCDataChannel>) {
        let ui = self.ui.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let ui = ui.clone();
            Box::pin(async move {
                match serde_json::from_slice::<RealtimeEvent>(&msg.data) {
                    Ok(event) => {
                        for update in events::dispatch(event) {
                            let _ = ui.send(update);
                        }
                    }
                    Err(err) => debug!(error = %err, "undecodable control message"),
                }
            })
        }));
        channel.on_open(Box::new(|| {
            Box::pin(async {
                debug!("event channel open");
            })
        }));
        channel.on_close(Box::new(|| {
            Box::pin(async {
                debug!("event channel closed");
            })
        }));
        channel.on_error(Box::new(|err| {
            Box::pin(async move {
                warn!(error = %err, "event channel error");
            })
        }));
    }
}

fn build_api() -> Result<API, SessionError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

fn credential_from_body(body: &serde_json::Value) -> Result<String, SessionError> {
    body.get("client_secret")
        .and_then(|secret| secret.get("value"))
        .and_then(|value| value.as_str())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            SessionError::InvalidCredential("missing client_secret.value".to_string())
        })
}

/// Compands captured frames and writes them to the local track. Ends when
/// capture stops or the track dies.
async fn pump_frames(
    track: Arc<TrackLocalStaticSample>,
    mut frames: mpsc::UnboundedReceiver<Vec<i16>>,
) {
    while let Some(frame) = frames.recv().await {
        let sample = Sample {
            data: Bytes::from(g711::encode_frame(&frame)),
            duration: media::FRAME_DURATION,
            ..Default::default()
        };
        if let Err(err) = track.write_sample(&sample).await {
            debug!(error = %err, "local track write failed");
            break;
        }
    }
}

fn is_pcmu(mime_type: &str) -> bool {
    mime_type.eq_ignore_ascii_case(MIME_TYPE_PCMU)
}

/// Drains one remote audio track into the speaker queue.
///
/// Only PCMU payloads reach the speaker; packets from any other
/// negotiated codec are counted and dropped rather than fed to the
/// mu-law decoder as garbage.
async fn drain_remote(track: Arc<TrackRemote>, speaker: Option<std_mpsc::Sender<Vec<i16>>>) {
    let mime_type = track.codec().capability.mime_type;
    let decodable = is_pcmu(&mime_type);
    if !decodable {
        warn!(%mime_type, "remote track uses an unsupported codec; dropping its packets");
    }
    debug!(ssrc = track.ssrc(), %mime_type, "remote audio track attached");

    let mut dropped: u64 = 0;
    loop {
        match track.read_rtp().await {
            Ok((packet, _)) => {
                if !decodable {
                    dropped += 1;
                    continue;
                }
                if let Some(speaker) = &speaker {
                    let _ = speaker.send(g711::decode_frame(&packet.payload));
                }
            }
            Err(err) => {
                debug!(error = %err, "remote track ended");
                break;
            }
        }
    }
    if dropped > 0 {
        debug!(dropped, %mime_type, "dropped packets from unsupported codec");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn close_without_a_session_is_a_noop() {
        let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
        let mut controller = SessionController::new(ClientConfig::default(), ui_tx);
        controller.close().await;
        controller.close().await;
        assert!(!controller.is_active());
    }

    #[test]
    fn only_pcmu_payloads_are_decodable() {
        assert!(is_pcmu("audio/PCMU"));
        assert!(is_pcmu("audio/pcmu"));
        assert!(!is_pcmu("audio/opus"));
        assert!(!is_pcmu("audio/PCMA"));
        assert!(!is_pcmu(""));
    }

    #[test]
    fn credential_extraction_requires_the_documented_shape() {
        let body = json!({ "id": "sess_1", "client_secret": { "value": "ek_abc" } });
        assert_eq!(credential_from_body(&body).expect("credential"), "ek_abc");

        for bad in [
            json!({}),
            json!({ "client_secret": {} }),
            json!({ "client_secret": { "value": "" } }),
            json!({ "client_secret": { "value": 42 } }),
        ] {
            assert!(matches!(
                credential_from_body(&bad),
                Err(SessionError::InvalidCredential(_))
            ));
        }
    }
}
