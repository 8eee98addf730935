//! ElevenLabs-style speech synthesis gateway.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::SynthesisConfig;
use crate::error::{GatewayError, Result};
use crate::gateways::generation::map_status;
use crate::gateways::{AudioPayload, SynthesisGateway};

/// Voice rendering parameters sent with every request.
#[derive(Debug, Clone, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// Text-to-speech client returning MP3 audio.
pub struct ElevenLabsSynthesis {
    url: String,
    api_key: String,
    model_id: String,
    voice_settings: VoiceSettings,
    client: reqwest::Client,
}

impl ElevenLabsSynthesis {
    /// Create a client, resolving the API key from config.
    ///
    /// # Errors
    ///
    /// Returns a config error if no API key is available.
    pub fn new(config: SynthesisConfig) -> Result<Self> {
        let api_key = config.api_key.resolve("synthesis")?;
        let url = format!(
            "{}/{}",
            config.api_url.trim_end_matches('/'),
            config.voice_id
        );
        info!(voice = %config.voice_id, "synthesis gateway configured");
        Ok(Self {
            url,
            api_key,
            model_id: config.model_id,
            voice_settings: VoiceSettings {
                stability: config.stability,
                similarity_boost: config.similarity_boost,
                style: config.style,
                use_speaker_boost: config.use_speaker_boost,
            },
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait::async_trait]
impl SynthesisGateway for ElevenLabsSynthesis {
    async fn synthesize(&self, text: &str) -> std::result::Result<AudioPayload, GatewayError> {
        let request = SynthesisRequest {
            text,
            model_id: &self.model_id,
            voice_settings: &self.voice_settings,
        };

        debug!(chars = text.len(), "requesting synthesis");

        let response = self
            .client
            .post(&self.url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status(status, &detail));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(AudioPayload {
            bytes: bytes.to_vec(),
        })
    }
}

/// Strip markup a generation model tends to emit so the synthesized voice
/// does not read it aloud: code fences, inline code markers, emphasis
/// markers, heading hashes, list bullets, and link targets.
#[must_use]
pub fn sanitize_spoken_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_code_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_code_fence = !in_code_fence;
            continue;
        }
        if in_code_fence {
            continue;
        }

        let stripped = trimmed
            .trim_start_matches('#')
            .trim_start_matches(|c| c == '-' || c == '*' || c == '>')
            .trim_start();

        let mut cleaned = String::with_capacity(stripped.len());
        let mut chars = stripped.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' | '_' | '`' => {}
                // [label](target) reads as just the label.
                '[' => {
                    let mut label = String::new();
                    for inner in chars.by_ref() {
                        if inner == ']' {
                            break;
                        }
                        label.push(inner);
                    }
                    if chars.peek() == Some(&'(') {
                        chars.next();
                        for inner in chars.by_ref() {
                            if inner == ')' {
                                break;
                            }
                        }
                    }
                    cleaned.push_str(&label);
                }
                _ => cleaned.push(c),
            }
        }

        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(cleaned);
    }

    out
}
