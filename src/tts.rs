//! Speech synthesis via the Gemini TTS `generateContent` API.

use crate::config::TtsConfig;
use crate::error::{ChatError, Result};
use crate::playback::EncodedAudio;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

/// Collaborator seam: text → encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` to encoded audio.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Synthesis`] when no audio could be produced.
    /// Callers treat this as "no audio available" and skip playback; the
    /// reply text itself is unaffected.
    async fn synthesize(&self, text: &str) -> Result<EncodedAudio>;
}

/// HTTP client for a Gemini-compatible TTS endpoint.
pub struct GeminiTts {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl GeminiTts {
    /// Create a synthesizer from config and a resolved API key.
    pub fn new(config: &TtsConfig, api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: config.model.clone(),
            voice: config.voice.clone(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiTts {
    async fn synthesize(&self, text: &str) -> Result<EncodedAudio> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Synthesis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Synthesis(format!("backend returned {status}")));
        }

        let parsed: TtsResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Synthesis(format!("malformed response: {e}")))?;

        let inline = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.inline_data))
            .ok_or_else(|| ChatError::Synthesis("response contained no audio".into()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| ChatError::Synthesis(format!("invalid base64 audio: {e}")))?;

        Ok(EncodedAudio {
            bytes,
            mime_type: inline.mime_type,
        })
    }
}

// -- Response wire format (the subset this crate reads) --

#[derive(Debug, Deserialize)]
struct TtsResponse {
    #[serde(default)]
    candidates: Vec<TtsCandidate>,
}

#[derive(Debug, Deserialize)]
struct TtsCandidate {
    content: TtsContent,
}

#[derive(Debug, Deserialize)]
struct TtsContent {
    #[serde(default)]
    parts: Vec<TtsPart>,
}

#[derive(Debug, Deserialize)]
struct TtsPart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}
