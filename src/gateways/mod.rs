//! Downstream gateway contracts: generation, synthesis, playback, and
//! screen capture.
//!
//! The orchestrator only ever talks to these traits; concrete HTTP and
//! audio-device implementations live in the submodules, and tests
//! substitute recording fakes.

pub mod generation;
pub mod playback;
pub mod synthesis;

use async_trait::async_trait;
use base64::Engine as _;

use crate::conversation::ChatEntry;
use crate::error::{CaptureError, GatewayError, PlaybackError};

/// An opaque encoded screen image. Compared by byte equality; never
/// persisted, dropped after the comparison or generation call that
/// needed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSnapshot {
    jpeg: Vec<u8>,
}

impl ScreenSnapshot {
    /// Wrap encoded JPEG bytes.
    #[must_use]
    pub fn from_jpeg(jpeg: Vec<u8>) -> Self {
        Self { jpeg }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }

    /// Render as a `data:` URL for multimodal generation requests.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// Synthesized audio, opaque to everything but playback.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    /// Encoded audio bytes (MP3 for the ElevenLabs gateway).
    pub bytes: Vec<u8>,
}

/// Produces a response for a conversation context, optionally grounded in
/// a screen snapshot.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Request a response. `image`, when present, routes the request
    /// through the vision path.
    async fn generate(
        &self,
        context: &[ChatEntry],
        image: Option<&ScreenSnapshot>,
    ) -> Result<String, GatewayError>;
}

/// Synthesizes spoken audio from text.
#[async_trait]
pub trait SynthesisGateway: Send + Sync {
    /// Synthesize `text`. Implementations receive pre-sanitized text
    /// (markup stripped) from the orchestrator.
    async fn synthesize(&self, text: &str) -> Result<AudioPayload, GatewayError>;
}

/// Plays synthesized audio; resolves when playback completes.
#[async_trait]
pub trait PlaybackGateway: Send + Sync {
    /// Play the payload to completion.
    async fn play(&self, audio: AudioPayload) -> Result<(), PlaybackError>;
}

/// Captures the current screen contents.
#[async_trait]
pub trait ScreenCaptureGateway: Send + Sync {
    /// Capture a snapshot. `full_page` requests more than the visible
    /// viewport where the provider supports it.
    async fn capture(&self, full_page: bool) -> Result<ScreenSnapshot, CaptureError>;
}

/// Capture gateway for hosts without a capture provider. Every call
/// fails with [`CaptureError::Unavailable`], which callers recover from
/// by falling back to the plain text path.
pub struct NullScreenCapture;

#[async_trait]
impl ScreenCaptureGateway for NullScreenCapture {
    async fn capture(&self, _full_page: bool) -> Result<ScreenSnapshot, CaptureError> {
        Err(CaptureError::Unavailable(
            "no capture provider on this host".to_owned(),
        ))
    }
}
