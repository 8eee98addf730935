//! Speech-recognition engine capability contract.
//!
//! The engine is an external capability: something that can be told to
//! listen and then emits transcript fragments until it stops, faults, or
//! is told to end. The recognition session layers mode exclusivity and
//! restart behavior on top of this contract.

use tokio::sync::mpsc;

use crate::error::Result;

/// Listening mode requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Low-commitment continuous scanning for a wake phrase.
    Passive,
    /// Full utterance capture.
    Active,
}

/// Terminal faults an engine run can end with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFault {
    /// The engine gave up without hearing anything.
    NoSpeech,
    /// The host aborted the engine.
    Aborted,
    /// Microphone or recognition permission denied.
    PermissionDenied,
    /// Any other engine-specific failure.
    Other(String),
}

/// Events emitted by a running engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A transcript fragment. Interim fragments may be revised later;
    /// only fragments with `is_final` set are stable.
    Fragment {
        /// Transcribed text.
        text: String,
        /// Whether this fragment is finalized.
        is_final: bool,
    },
    /// A terminal fault. No further events follow on this stream.
    Fault(EngineFault),
}

/// A continuous speech-recognition capability.
///
/// `begin` starts one listening run and returns its event stream. The
/// stream closing without a [`EngineEvent::Fault`] means the engine
/// stopped unexpectedly; the session decides whether to restart it.
/// `end` halts the current run; it must be safe to call at any time.
pub trait SpeechEngine: Send + Sync {
    /// Start listening in the given mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start at all (as opposed to
    /// starting and then faulting, which is reported on the stream).
    fn begin(&self, mode: RecognitionMode) -> Result<mpsc::Receiver<EngineEvent>>;

    /// Halt the current listening run, if any.
    fn end(&self);
}
