//! OpenAI-compatible chat-completions generation gateway.
//!
//! Works against any server implementing the chat completions API. Plain
//! turns send role/content strings; screen-augmented turns send a content
//! part array with the snapshot as a JPEG data-URL.

use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::conversation::ChatEntry;
use crate::error::{GatewayError, Result};
use crate::gateways::{GenerationGateway, ScreenSnapshot};

/// Chat-completions client for the generation gateway.
pub struct OpenAiGeneration {
    config: GenerationConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiGeneration {
    /// Create a client, resolving the API key from config.
    ///
    /// # Errors
    ///
    /// Returns a config error if no API key is available.
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let api_key = config.api_key.resolve("generation")?;
        info!(model = %config.model, "generation gateway configured");
        Ok(Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        })
    }

    fn build_messages(
        &self,
        context: &[ChatEntry],
        image: Option<&ScreenSnapshot>,
    ) -> Vec<serde_json::Value> {
        let system_prompt = if image.is_some() {
            &self.config.vision_system_prompt
        } else {
            &self.config.system_prompt
        };

        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(serde_json::json!({
            "role": "system",
            "content": system_prompt,
        }));

        for (i, entry) in context.iter().enumerate() {
            let is_last = i + 1 == context.len();
            // The snapshot rides with the newest user entry only.
            if is_last && entry.role == "user"
                && let Some(snapshot) = image
            {
                messages.push(serde_json::json!({
                    "role": entry.role,
                    "content": [
                        { "type": "text", "text": entry.content },
                        { "type": "image_url", "image_url": { "url": snapshot.data_url() } },
                    ],
                }));
            } else {
                messages.push(serde_json::json!({
                    "role": entry.role,
                    "content": entry.content,
                }));
            }
        }

        messages
    }
}

#[async_trait::async_trait]
impl GenerationGateway for OpenAiGeneration {
    async fn generate(
        &self,
        context: &[ChatEntry],
        image: Option<&ScreenSnapshot>,
    ) -> std::result::Result<String, GatewayError> {
        let max_tokens = if image.is_some() {
            self.config.max_tokens_vision
        } else {
            self.config.max_tokens
        };

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": self.build_messages(context, image),
            "max_tokens": max_tokens,
            "temperature": self.config.temperature,
        });

        debug!(
            entries = context.len(),
            with_image = image.is_some(),
            "requesting generation"
        );

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status(status, &detail));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GatewayError::Unavailable("generation response carried no content".to_owned())
            })?;

        Ok(text.to_owned())
    }
}

/// Map an HTTP status to the gateway failure taxonomy.
pub(crate) fn map_status(status: reqwest::StatusCode, detail: &str) -> GatewayError {
    match status.as_u16() {
        401 | 403 => GatewayError::Unauthenticated,
        429 => GatewayError::RateLimited,
        _ => GatewayError::Unavailable(format!("HTTP {status}: {detail}")),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::SecretRef;

    fn test_config() -> GenerationConfig {
        GenerationConfig {
            api_key: SecretRef::Literal {
                value: "k-test".to_owned(),
            },
            ..GenerationConfig::default()
        }
    }

    fn entry(role: &'static str, content: &str) -> ChatEntry {
        ChatEntry {
            role,
            content: content.to_owned(),
        }
    }

    #[test]
    fn plain_messages_use_text_system_prompt() {
        let gateway = OpenAiGeneration::new(test_config()).unwrap();
        let messages = gateway.build_messages(&[entry("user", "hello")], None);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(
            messages[0]["content"],
            gateway.config.system_prompt.as_str()
        );
        assert_eq!(messages[1]["content"], "hello");
    }

    #[test]
    fn snapshot_rides_with_the_newest_user_entry() {
        let gateway = OpenAiGeneration::new(test_config()).unwrap();
        let snapshot = ScreenSnapshot::from_jpeg(vec![1, 2, 3]);
        let context = vec![
            entry("user", "earlier question"),
            entry("assistant", "earlier answer"),
            entry("user", "look at my screen"),
        ];

        let messages = gateway.build_messages(&context, Some(&snapshot));

        assert_eq!(
            messages[0]["content"],
            gateway.config.vision_system_prompt.as_str()
        );
        // Earlier entries stay plain.
        assert!(messages[1]["content"].is_string());
        // The last user entry carries the content-part array.
        let parts = messages[3]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(
            parts[1]["image_url"]["url"]
                .as_str()
                .unwrap()
                .starts_with("data:image/jpeg;base64,")
        );
    }

    #[test]
    fn status_mapping_follows_the_taxonomy() {
        use reqwest::StatusCode;
        assert_eq!(
            map_status(StatusCode::UNAUTHORIZED, ""),
            GatewayError::Unauthenticated
        );
        assert_eq!(
            map_status(StatusCode::FORBIDDEN, ""),
            GatewayError::Unauthenticated
        );
        assert_eq!(
            map_status(StatusCode::TOO_MANY_REQUESTS, ""),
            GatewayError::RateLimited
        );
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            GatewayError::Unavailable(_)
        ));
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = GenerationConfig {
            api_key: SecretRef::None,
            ..GenerationConfig::default()
        };
        assert!(OpenAiGeneration::new(config).is_err());
    }
}
