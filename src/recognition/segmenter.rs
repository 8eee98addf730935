//! Utterance segmentation: silence-delimited capture of one speech turn.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::RecognitionError;
use crate::recognition::{RecognitionSession, SessionEvent};

/// One captured user speech turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Trimmed transcript. Empty when nothing usable was heard.
    pub text: String,
    /// Whether the turn ended because the engine reported no speech
    /// (as opposed to trailing silence after speech).
    pub no_speech: bool,
}

impl Utterance {
    /// Whether this utterance carries no user intent.
    ///
    /// A whitespace-only transcript is treated identically to an empty one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Accumulates finalized fragments into one utterance, ended by a fixed
/// span of post-speech silence or an immediate no-speech condition.
pub struct UtteranceSegmenter {
    silence: Duration,
}

impl UtteranceSegmenter {
    /// Create a segmenter with the given trailing-silence span.
    #[must_use]
    pub fn new(silence: Duration) -> Self {
        Self { silence }
    }

    /// Capture one utterance from the session's active mode.
    ///
    /// The silence deadline is (re)armed on every finalized fragment; it
    /// is not armed before the first fragment, so an engine that never
    /// hears anything resolves through its no-speech report instead. A
    /// no-speech report with zero prior fragments yields an empty
    /// utterance immediately, not after the silence span.
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError::Busy`] if another mode is running, or
    /// the terminal fault if the engine dies irrecoverably.
    pub async fn capture(
        &self,
        session: &RecognitionSession,
    ) -> Result<Utterance, RecognitionError> {
        let mut handle = session.start_active()?;
        let mut accumulated = String::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let silence_elapsed = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    // No fragment yet: wait on events only.
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = silence_elapsed => {
                    handle.stop();
                    let text = accumulated.trim().to_owned();
                    info!(chars = text.len(), "utterance ended by silence");
                    return Ok(Utterance { text, no_speech: false });
                }
                event = handle.recv() => match event {
                    Some(SessionEvent::Final(fragment)) => {
                        if !accumulated.is_empty() {
                            accumulated.push(' ');
                        }
                        accumulated.push_str(&fragment);
                        deadline = Some(Instant::now() + self.silence);
                        debug!(chars = accumulated.len(), "fragment accumulated");
                    }
                    Some(SessionEvent::NoSpeech) => {
                        handle.stop();
                        let text = accumulated.trim().to_owned();
                        let no_speech = text.is_empty();
                        if no_speech {
                            info!("no speech; delivering empty utterance");
                        }
                        return Ok(Utterance { text, no_speech });
                    }
                    Some(SessionEvent::Fault(e)) => {
                        handle.stop();
                        return Err(e);
                    }
                    None => {
                        // Halted externally (session stop or shutdown):
                        // deliver whatever was accumulated.
                        let text = accumulated.trim().to_owned();
                        return Ok(Utterance { no_speech: text.is_empty(), text });
                    }
                }
            }
        }
    }
}
