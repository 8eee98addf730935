//! Wake-phrase listening on top of the recognition session's passive mode.

use tracing::{debug, info};

use crate::error::RecognitionError;
use crate::recognition::{RecognitionSession, SessionEvent};

/// A fixed set of trigger phrases, normalized for matching. Used for wake
/// phrases, power-down phrases, and screen-need keywords alike.
#[derive(Debug, Clone)]
pub struct PhraseSet {
    phrases: Vec<String>,
}

impl PhraseSet {
    /// Build a phrase set. Phrases are trimmed and lowercased; empty
    /// entries are discarded.
    #[must_use]
    pub fn new(phrases: &[String]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive substring match. Returns the first phrase that
    /// occurs in `text`, or `None`.
    #[must_use]
    pub fn matches(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.phrases
            .iter()
            .find(|p| lower.contains(p.as_str()))
            .map(String::as_str)
    }

    /// The normalized phrases, in match priority order.
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

/// Scans passive-mode finalized fragments for a wake phrase.
pub struct WakeWordListener {
    phrases: PhraseSet,
}

impl WakeWordListener {
    /// Create a listener for the given phrase set.
    #[must_use]
    pub fn new(phrases: PhraseSet) -> Self {
        Self { phrases }
    }

    /// Listen until a finalized fragment contains a wake phrase.
    ///
    /// The first match wins. The underlying session is halted before this
    /// returns, so the waking utterance is never reprocessed as a command.
    /// No-speech notifications are ignored; passive scanning just keeps
    /// going.
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError::Busy`] if another mode is running, or
    /// the terminal fault if the engine dies irrecoverably.
    pub async fn listen(&self, session: &RecognitionSession) -> Result<(), RecognitionError> {
        let mut handle = session.start_passive()?;

        while let Some(event) = handle.recv().await {
            match event {
                SessionEvent::Final(text) => {
                    if let Some(phrase) = self.phrases.matches(&text) {
                        info!(phrase, "wake phrase detected");
                        handle.stop();
                        return Ok(());
                    }
                    debug!("fragment without wake phrase discarded");
                }
                SessionEvent::NoSpeech => {}
                SessionEvent::Fault(e) => return Err(e),
            }
        }

        // The mode was halted externally (session stop or shutdown).
        Err(RecognitionError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn phrases(list: &[&str]) -> PhraseSet {
        PhraseSet::new(&list.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>())
    }

    #[test]
    fn matches_are_case_insensitive_substrings() {
        let set = phrases(&["hey friday", "friday", "wake up friday"]);
        assert_eq!(set.matches("Hey Friday, what time is it?"), Some("hey friday"));
        assert_eq!(set.matches("FRIDAY"), Some("friday"));
        assert_eq!(set.matches("good morning"), None);
    }

    #[test]
    fn first_listed_match_wins() {
        let set = phrases(&["hey friday", "friday"]);
        // Both phrases occur; the first listed one is reported.
        assert_eq!(set.matches("hey friday wake up"), Some("hey friday"));
        // Only the shorter phrase occurs.
        assert_eq!(set.matches("morning, friday"), Some("friday"));
    }

    #[test]
    fn phrases_are_normalized() {
        let set = phrases(&["  Hey FRIDAY  ", "", "Friday"]);
        assert_eq!(set.phrases(), &["hey friday", "friday"]);
    }

    #[test]
    fn punctuation_inside_text_does_not_block_a_match() {
        let set = phrases(&["friday"]);
        assert_eq!(set.matches("Friday, are you there?"), Some("friday"));
    }

    #[test]
    fn power_down_phrases_match_mid_sentence() {
        let set = phrases(&["power down", "go to sleep", "power off"]);
        assert_eq!(set.matches("alright, go to sleep now"), Some("go to sleep"));
        assert_eq!(set.matches("Power Down please"), Some("power down"));
        assert_eq!(set.matches("keep going"), None);
    }
}
