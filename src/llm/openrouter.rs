//! OpenRouter chat completions

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use super::TextGenerator;
use crate::{
    TravelError,
    config::LlmConfig,
    http::{build_client, read_json, send_error, trim_base_url},
};

const SERVICE: &str = "OpenRouter";

pub struct OpenRouterClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    /// `None` when no API key is configured
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, TravelError> {
        let Some(api_key) = config.api_key.as_ref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let timeout = Duration::from_secs(config.timeout_seconds);
        Ok(Some(Self {
            client: build_client(timeout, config.max_retries)?,
            base_url: trim_base_url(&config.base_url),
            api_key: api_key.trim().to_string(),
            model: config.model.clone(),
            timeout,
        }))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    code: Option<u16>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String, TravelError> {
        if let Some(error) = self.error {
            return Err(TravelError::upstream(SERVICE, error.code, error.message));
        }
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| TravelError::invalid_response(SERVICE, "response contained no message"))
    }
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    #[tracing::instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, TravelError> {
        let body = serde_json::to_vec(&ChatRequest {
            model: &self.model,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        })
        .map_err(|e| TravelError::general(format!("failed to encode request: {e}")))?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, self.timeout, e))?;
        let chat: ChatResponse = read_json(SERVICE, self.timeout, response).await?;
        let text = chat.into_text()?;
        tracing::info!(chars = text.len(), "completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_first_choice() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "  {\"a\": 1}\n"}}]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_embedded_error() {
        let response: ChatResponse = serde_json::from_value(json!({
            "error": {"message": "Rate limit exceeded", "code": 429}
        }))
        .unwrap();
        assert!(matches!(
            response.into_text(),
            Err(TravelError::Upstream { status: Some(429), .. })
        ));
    }

    #[test]
    fn test_empty_choices() {
        let response: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            response.into_text(),
            Err(TravelError::UpstreamInvalidResponse { .. })
        ));
    }

    #[test]
    fn test_disabled_without_key() {
        let config = LlmConfig {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "m".into(),
            timeout_seconds: 5,
            max_retries: 0,
        };
        assert!(OpenRouterClient::from_config(&config).unwrap().is_none());
    }
}
