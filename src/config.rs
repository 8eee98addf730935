//! Configuration types for the voice-interaction loop.

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Conversation behavior (wake phrases, power-down phrases, history window).
    pub conversation: ConversationConfig,
    /// Recognition session timing.
    pub recognition: RecognitionConfig,
    /// Ambient screen monitor settings.
    pub monitor: MonitorConfig,
    /// Text-generation gateway settings.
    pub generation: GenerationConfig,
    /// Speech-synthesis gateway settings.
    pub synthesis: SynthesisConfig,
}

/// Conversation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Phrases that wake the assistant from standby (case-insensitive
    /// substring match on finalized transcript fragments).
    pub wake_phrases: Vec<String>,
    /// Phrases that power the assistant down mid-conversation.
    pub power_down_phrases: Vec<String>,
    /// Keywords that route an utterance through the screen-augmented
    /// generation path.
    pub screen_keywords: Vec<String>,
    /// Spoken acknowledgement for a power-down command.
    pub power_down_ack: String,
    /// Whether the assistant returns to active listening after each turn
    /// instead of requiring a new wake phrase.
    pub continuous: bool,
    /// Number of trailing messages exposed as generation context.
    pub history_window: usize,
    /// Delay before re-listening after an empty utterance, in milliseconds.
    pub relisten_delay_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            wake_phrases: vec![
                "hey friday".to_owned(),
                "friday".to_owned(),
                "wake up friday".to_owned(),
            ],
            power_down_phrases: vec![
                "power down".to_owned(),
                "standby".to_owned(),
                "sleep".to_owned(),
                "shut down".to_owned(),
                "go to sleep".to_owned(),
                "power off".to_owned(),
            ],
            screen_keywords: vec![
                "screen".to_owned(),
                "see".to_owned(),
                "look".to_owned(),
                "analyze".to_owned(),
            ],
            power_down_ack: "Powering down...".to_owned(),
            continuous: true,
            history_window: 10,
            relisten_delay_ms: 300,
        }
    }
}

/// Recognition session timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Post-speech silence that ends an utterance, in milliseconds.
    pub silence_ms: u64,
    /// Backoff before restarting the engine after an unexpected stop,
    /// in milliseconds.
    pub restart_backoff_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            silence_ms: 2_000,
            restart_backoff_ms: 250,
        }
    }
}

/// Ambient screen monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whether the monitor runs at all.
    pub enabled: bool,
    /// Seconds between monitor ticks.
    pub interval_s: u64,
    /// Instruction sent with each ambient snapshot analysis.
    pub prompt: String,
    /// Analyses shorter than this (in characters) are discarded.
    pub min_suggestion_len: usize,
    /// Analyses containing any of these phrases are discarded.
    pub suppression_phrases: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_s: 30,
            prompt: "Briefly note anything on this screen the user might want \
                     help with. If nothing stands out, reply exactly: looks good."
                .to_owned(),
            min_suggestion_len: 20,
            suppression_phrases: vec![
                "looks good".to_owned(),
                "nothing notable".to_owned(),
                "nothing stands out".to_owned(),
            ],
        }
    }
}

/// Reference to a gateway API key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretRef {
    /// No API key configured.
    #[default]
    None,
    /// Inline literal key (discouraged; prefer env).
    Literal { value: String },
    /// Resolve the key from an environment variable.
    Env { var: String },
}

impl SecretRef {
    /// Resolve the secret to a concrete key.
    ///
    /// # Errors
    ///
    /// Returns a config error if no key is configured or the referenced
    /// environment variable is missing or empty.
    pub fn resolve(&self, what: &str) -> Result<String> {
        match self {
            Self::None => Err(AssistantError::Config(format!(
                "{what} API key not configured"
            ))),
            Self::Literal { value } => Ok(value.clone()),
            Self::Env { var } => {
                let value = std::env::var(var).map_err(|_| {
                    AssistantError::Config(format!("{what} API key env var is missing: {var}"))
                })?;
                if value.trim().is_empty() {
                    return Err(AssistantError::Config(format!(
                        "{what} API key env var is empty: {var}"
                    )));
                }
                Ok(value)
            }
        }
    }
}

/// Text-generation gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Chat-completions endpoint URL.
    pub api_url: String,
    /// Model identifier.
    pub model: String,
    /// API key reference.
    pub api_key: SecretRef,
    /// Token budget for plain text turns.
    pub max_tokens: u32,
    /// Token budget for screen-augmented turns.
    pub max_tokens_vision: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// System prompt for plain text turns.
    pub system_prompt: String,
    /// System prompt for screen-augmented turns.
    pub vision_system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            api_key: SecretRef::Env {
                var: "OPENAI_API_KEY".to_owned(),
            },
            max_tokens: 150,
            max_tokens_vision: 300,
            temperature: 0.7,
            system_prompt: "You are FRIDAY, an advanced AI assistant like from \
                            Iron Man. Be helpful, intelligent, and slightly witty. \
                            Keep responses concise and conversational. You have a \
                            female personality and should respond as FRIDAY would - \
                            professional but with personality."
                .to_owned(),
            vision_system_prompt: "You are FRIDAY, an advanced AI assistant like \
                                   from Iron Man. You can see the user's screen and \
                                   help them with what they're doing. Be helpful, \
                                   intelligent, and slightly witty. Analyze the \
                                   screen content and provide specific, actionable \
                                   assistance based on what you see. Keep responses \
                                   concise but informative."
                .to_owned(),
        }
    }
}

/// Speech-synthesis gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Text-to-speech endpoint base URL (voice id is appended).
    pub api_url: String,
    /// Voice identifier.
    pub voice_id: String,
    /// Synthesis model identifier.
    pub model_id: String,
    /// API key reference.
    pub api_key: SecretRef,
    /// Voice stability (0.0 - 1.0).
    pub stability: f32,
    /// Similarity boost (0.0 - 1.0).
    pub similarity_boost: f32,
    /// Style exaggeration (0.0 - 1.0).
    pub style: f32,
    /// Whether to enable speaker boost.
    pub use_speaker_boost: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.elevenlabs.io/v1/text-to-speech".to_owned(),
            voice_id: "EXAVITQu4vr4xnSDxMaL".to_owned(),
            model_id: "eleven_monolingual_v1".to_owned(),
            api_key: SecretRef::Env {
                var: "ELEVENLABS_API_KEY".to_owned(),
            },
            stability: 0.5,
            similarity_boost: 0.8,
            style: 0.3,
            use_speaker_boost: true,
        }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| AssistantError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/friday/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/friday-config"))
            .join("friday")
            .join("config.toml")
    }

    /// Check invariants the rest of the system relies on.
    ///
    /// # Errors
    ///
    /// Returns a config error describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.conversation.wake_phrases.is_empty() {
            return Err(AssistantError::Config(
                "at least one wake phrase is required".to_owned(),
            ));
        }
        if self.conversation.power_down_phrases.is_empty() {
            return Err(AssistantError::Config(
                "at least one power-down phrase is required".to_owned(),
            ));
        }
        if self.conversation.history_window == 0 {
            return Err(AssistantError::Config(
                "history_window must be at least 1".to_owned(),
            ));
        }
        if self.recognition.silence_ms == 0 {
            return Err(AssistantError::Config(
                "silence_ms must be non-zero".to_owned(),
            ));
        }
        if self.monitor.enabled && self.monitor.interval_s == 0 {
            return Err(AssistantError::Config(
                "monitor interval_s must be non-zero when enabled".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.conversation.wake_phrases.is_empty());
        assert!(!config.conversation.power_down_phrases.is_empty());
        assert_eq!(config.conversation.history_window, 10);
        assert_eq!(config.recognition.silence_ms, 2_000);
        assert_eq!(config.monitor.interval_s, 30);
        assert!(config.generation.max_tokens > 0);
        assert!(config.generation.temperature >= 0.0);
        assert!(config.synthesis.stability >= 0.0 && config.synthesis.stability <= 1.0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AssistantConfig::default();
        config.conversation.continuous = false;
        config.recognition.silence_ms = 1_500;
        config.generation.model = "gpt-4o".to_owned();

        config.save_to_file(&path).unwrap();
        assert!(path.exists());

        let loaded = AssistantConfig::from_file(&path).unwrap();
        assert!(!loaded.conversation.continuous);
        assert_eq!(loaded.recognition.silence_ms, 1_500);
        assert_eq!(loaded.generation.model, "gpt-4o");
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result =
            AssistantConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_empty_wake_phrases() {
        let mut config = AssistantConfig::default();
        config.conversation.wake_phrases.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_history_window() {
        let mut config = AssistantConfig::default();
        config.conversation.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_silence() {
        let mut config = AssistantConfig::default();
        config.recognition.silence_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn secret_ref_env_resolves() {
        // Use a var name unlikely to collide with the environment.
        unsafe { std::env::set_var("FRIDAY_TEST_SECRET", "k-123") };
        let secret = SecretRef::Env {
            var: "FRIDAY_TEST_SECRET".to_owned(),
        };
        assert_eq!(secret.resolve("test").unwrap(), "k-123");
        unsafe { std::env::remove_var("FRIDAY_TEST_SECRET") };
    }

    #[test]
    fn secret_ref_none_is_an_error() {
        assert!(SecretRef::None.resolve("generation").is_err());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = AssistantConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("friday"));
    }
}
