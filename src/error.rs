//! Error types for the voice-interaction loop.

/// Faults raised by the recognition session or the underlying speech engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    /// The engine heard nothing. Recoverable: resolved as an empty
    /// utterance, never surfaced to the user.
    #[error("no speech detected")]
    NoSpeech,

    /// Microphone or recognition permission was denied by the host.
    #[error("recognition permission denied")]
    PermissionDenied,

    /// The engine was aborted by the host mid-capture.
    #[error("recognition aborted")]
    Aborted,

    /// A passive or active mode is already running on this session.
    #[error("recognition session busy")]
    Busy,

    /// Any other engine fault.
    #[error("recognition engine error: {0}")]
    Engine(String),
}

/// Failures from the generation and synthesis gateways.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Missing or rejected credentials.
    #[error("gateway authentication failed")]
    Unauthenticated,

    /// The remote service throttled the request.
    #[error("gateway rate limited")]
    RateLimited,

    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("gateway network error: {0}")]
    Network(String),

    /// The service answered but could not serve the request.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Screen capture failures. Always recovered locally: the turn falls back
/// to plain text generation and the ambient monitor skips the tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// No capture provider on this host, or the provider refused.
    #[error("screen capture unavailable: {0}")]
    Unavailable(String),
}

/// Audio playback failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// The audio payload could not be decoded.
    #[error("audio decode error: {0}")]
    Decode(String),

    /// Output device or stream error.
    #[error("audio device error: {0}")]
    Device(String),
}

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Recognition session or engine fault.
    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    /// Generation or synthesis gateway fault.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Screen capture fault.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Playback fault.
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
