//! Friday: continuous voice-interaction orchestrator with ambient screen
//! awareness.
//!
//! The assistant waits in standby for a wake phrase, captures one spoken
//! utterance delimited by trailing silence, generates a reply (optionally
//! grounded in a screen snapshot), speaks it, and loops until a power-down
//! phrase or an explicit stop.
//!
//! # Architecture
//!
//! One tokio state machine owns every moving part and multiplexes their
//! events:
//! - **Recognition session**: wraps a [`engine::SpeechEngine`] capability,
//!   enforces one-mode-at-a-time, restarts transient engine faults
//! - **Wake-word listener / utterance segmenter**: passive and active
//!   consumers of the session
//! - **Ambient monitor**: periodic screen capture, change-gated analysis,
//!   suppression-filtered spoken asides
//! - **Gateways**: generation, synthesis, playback, and screen capture
//!   behind traits, with HTTP and audio-device implementations
//! - **Orchestrator**: the Standby / Listening / Thinking / Speaking state
//!   machine tying it all together

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod gateways;
pub mod monitor;
pub mod orchestrator;
pub mod recognition;

pub use config::AssistantConfig;
pub use conversation::{ConversationLog, ConversationMessage, Originator};
pub use error::{AssistantError, GatewayError, RecognitionError, Result};
pub use orchestrator::{
    AssistantEvent, AssistantHandle, AssistantState, ControlCommand, Gateways, Orchestrator,
};
