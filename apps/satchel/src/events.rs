//! Control-channel events and their mapping onto display updates.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptPayload {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub modalities: Vec<String>,
    #[serde(default)]
    pub text: String,
}

/// Events arriving over the `oai-events` data channel. Anything with an
/// unrecognized `type` folds into `Unknown` and is dropped quietly so a
/// provider-side addition never breaks the session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    #[serde(rename = "transcript.partial")]
    TranscriptPartial {
        #[serde(default)]
        transcript: TranscriptPayload,
    },
    #[serde(rename = "transcript.complete")]
    TranscriptComplete {
        #[serde(default)]
        transcript: TranscriptPayload,
    },
    #[serde(rename = "response.partial")]
    ResponsePartial {
        #[serde(default)]
        response: ResponsePayload,
    },
    #[serde(rename = "response.complete")]
    ResponseComplete {
        #[serde(default)]
        response: ResponsePayload,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageHint {
    English,
    Urdu,
}

/// Best-effort script sniffing: any Arabic-block character marks the text
/// as Urdu, everything else as English. Empty text carries no hint.
pub fn detect_language(text: &str) -> Option<LanguageHint> {
    if text.trim().is_empty() {
        None
    } else if text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c)) {
        Some(LanguageHint::Urdu)
    } else {
        Some(LanguageHint::English)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Status(String),
    UserTranscript {
        text: String,
        language: Option<LanguageHint>,
    },
    AssistantTranscript(String),
}

pub const IDLE_STATUS: &str = "All done! Press the button to ask another question.";
pub const ERROR_STATUS: &str = "Oops! Something went wrong. Please try again.";

/// Maps one control event to zero or more display updates.
///
/// Assistant text only renders when the response actually carries the text
/// modality; a completed response also flips the status line back to idle.
pub fn dispatch(event: RealtimeEvent) -> Vec<UiUpdate> {
    match event {
        RealtimeEvent::TranscriptPartial { transcript }
        | RealtimeEvent::TranscriptComplete { transcript } => {
            let language = detect_language(&transcript.text);
            vec![UiUpdate::UserTranscript {
                text: transcript.text,
                language,
            }]
        }
        RealtimeEvent::ResponsePartial { response } => {
            if response.modalities.iter().any(|m| m == "text") {
                vec![UiUpdate::AssistantTranscript(response.text)]
            } else {
                Vec::new()
            }
        }
        RealtimeEvent::ResponseComplete { response } => {
            let mut updates = Vec::new();
            if response.modalities.iter().any(|m| m == "text") {
                updates.push(UiUpdate::AssistantTranscript(response.text));
            }
            updates.push(UiUpdate::Status(IDLE_STATUS.to_string()));
            updates
        }
        RealtimeEvent::Error { error } => {
            tracing::warn!(%error, "provider reported an error event");
            vec![UiUpdate::Status(ERROR_STATUS.to_string())]
        }
        RealtimeEvent::Unknown => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> RealtimeEvent {
        serde_json::from_str(raw).expect("parse event")
    }

    #[test]
    fn transcript_events_carry_a_language_hint() {
        let updates = dispatch(parse(
            r#"{"type":"transcript.complete","transcript":{"text":"what is 2 plus 2"}}"#,
        ));
        assert_eq!(
            updates,
            vec![UiUpdate::UserTranscript {
                text: "what is 2 plus 2".to_string(),
                language: Some(LanguageHint::English),
            }]
        );

        let updates = dispatch(parse(
            "{\"type\":\"transcript.partial\",\"transcript\":{\"text\":\"\u{633}\u{644}\u{627}\u{645}\"}}",
        ));
        assert!(matches!(
            &updates[0],
            UiUpdate::UserTranscript {
                language: Some(LanguageHint::Urdu),
                ..
            }
        ));
    }

    #[test]
    fn audio_only_responses_render_no_text() {
        let updates = dispatch(parse(
            r#"{"type":"response.partial","response":{"modalities":["audio"],"text":"hidden"}}"#,
        ));
        assert!(updates.is_empty());
    }

    #[test]
    fn completed_response_returns_to_idle() {
        let updates = dispatch(parse(
            r#"{"type":"response.complete","response":{"modalities":["text","audio"],"text":"four"}}"#,
        ));
        assert_eq!(
            updates,
            vec![
                UiUpdate::AssistantTranscript("four".to_string()),
                UiUpdate::Status(IDLE_STATUS.to_string()),
            ]
        );
    }

    #[test]
    fn unrecognized_event_types_are_dropped() {
        let updates = dispatch(parse(r#"{"type":"rate_limits.updated","limits":[]}"#));
        assert!(updates.is_empty());
    }

    #[test]
    fn error_events_surface_a_friendly_status() {
        let updates = dispatch(parse(r#"{"type":"error","error":{"message":"boom"}}"#));
        assert_eq!(updates, vec![UiUpdate::Status(ERROR_STATUS.to_string())]);
    }
}
