//! JSON wire protocol of the live dialogue service.
//!
//! Client frames are externally tagged (`{"setup": ..}`, `{"realtimeInput": ..}`);
//! server frames are a loose object where any of `setupComplete`,
//! `serverContent` or `goAway` may be present.

use crate::pipeline::types::RealtimeChunk;
use crate::studio::DirectorPersona;
use serde::{Deserialize, Serialize};

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on a fresh socket
    Setup(SetupRequest),
    /// Streaming microphone audio
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wrap one capture frame.
    pub fn audio(chunk: RealtimeChunk) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![chunk],
        })
    }
}

/// Response kinds the model may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}

/// Session configuration sent once after the socket opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    /// Fully qualified model name, `models/<id>`.
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl SetupRequest {
    /// Audio-only setup for `model`, steered by `persona`.
    pub fn audio(model: &str, persona: &DirectorPersona, voice: Option<&str>) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![Modality::Audio],
                speech_config: voice.map(SpeechConfig::prebuilt),
            },
            system_instruction: Some(Content::text(persona.system_instruction())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

impl SpeechConfig {
    fn prebuilt(voice_name: &str) -> Self {
        Self {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.to_string(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<RealtimeChunk>,
}

/// A list of parts, used for system instructions and model turns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(text: String) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

/// Inline binary data, base64 in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

/// Anything the server sends.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

impl ServerMessage {
    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// A message carrying response audio for playback.
    pub fn with_audio(payload: impl Into<String>) -> Self {
        Self {
            server_content: Some(ServerContent {
                model_turn: Some(Content {
                    parts: vec![Part {
                        text: None,
                        inline_data: Some(Blob {
                            mime_type: "audio/pcm;rate=24000".to_string(),
                            data: payload.into(),
                        }),
                    }],
                }),
                ..ServerContent::default()
            }),
            ..Self::default()
        }
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// base64 audio of the first part in the model turn that carries inline data.
    pub fn audio_payload(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
            .map(|blob| blob.data.as_str())
    }

    pub fn is_turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .is_some_and(|c| c.turn_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::{StudioOptions, WorkflowMode};

    fn persona() -> DirectorPersona {
        StudioOptions::default()
            .with_workflow(WorkflowMode::Ads)
            .director_persona()
    }

    #[test]
    fn test_setup_json_shape() {
        let setup = SetupRequest::audio("gemini-live", &persona(), Some("Aoede"));
        let json: serde_json::Value =
            serde_json::from_str(&ClientMessage::Setup(setup).to_json().unwrap()).unwrap();

        assert_eq!(json["setup"]["model"], "models/gemini-live");
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Aoede"
        );
        let instruction = json["setup"]["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap();
        assert!(instruction.contains("ADS"));
    }

    #[test]
    fn test_setup_keeps_qualified_model_and_omits_voice() {
        let setup = SetupRequest::audio("models/x", &persona(), None);
        assert_eq!(setup.model, "models/x");
        let json = ClientMessage::Setup(setup).to_json().unwrap();
        assert!(!json.contains("speechConfig"));
    }

    #[test]
    fn test_realtime_input_json_shape() {
        let msg = ClientMessage::audio(RealtimeChunk::pcm("AAAA".to_string(), 0));
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"realtimeInput":{"mediaChunks":[{"mimeType":"audio/pcm;rate=16000","data":"AAAA"}]}}"#
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        let msg = ServerMessage::from_json(r#"{"setupComplete":{}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(msg.audio_payload().is_none());
    }

    #[test]
    fn test_parse_audio_payload() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQI="}}
                    ]
                }
            }
        }"#;
        let msg = ServerMessage::from_json(raw).unwrap();
        assert_eq!(msg.audio_payload(), Some("AQI="));
        assert!(!msg.is_turn_complete());
    }

    #[test]
    fn test_audio_payload_skips_text_parts() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[
            {"text":"thinking"},
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"BBBB"}}
        ]}}}"#;
        let msg = ServerMessage::from_json(raw).unwrap();
        assert_eq!(msg.audio_payload(), Some("BBBB"));
    }

    #[test]
    fn test_turn_complete_without_audio() {
        let msg = ServerMessage::from_json(r#"{"serverContent":{"turnComplete":true}}"#).unwrap();
        assert!(msg.is_turn_complete());
        assert!(msg.audio_payload().is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let msg = ServerMessage::from_json(r#"{"usageMetadata":{"totalTokenCount":5}}"#).unwrap();
        assert_eq!(msg, ServerMessage::default());
    }

    #[test]
    fn test_with_audio_roundtrips_payload() {
        let msg = ServerMessage::with_audio("CCCC");
        assert_eq!(msg.audio_payload(), Some("CCCC"));
    }
}
