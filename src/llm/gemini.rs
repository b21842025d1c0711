//! Google Gemini `generateContent`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use super::TextGenerator;
use crate::{
    TravelError,
    config::LlmConfig,
    http::{build_client, read_json, send_error, trim_base_url},
};

const SERVICE: &str = "Gemini";

pub struct GeminiClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
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

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(&self.api_key)
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, TravelError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(TravelError::upstream(
                SERVICE,
                None,
                format!("prompt blocked: {reason}"),
            ));
        }
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(TravelError::invalid_response(
                SERVICE,
                "response contained no text",
            ));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    #[tracing::instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, TravelError> {
        let body = serde_json::to_vec(&GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        })
        .map_err(|e| TravelError::general(format!("failed to encode request: {e}")))?;

        let response = self
            .client
            .post(self.url())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, self.timeout, e))?;
        let generated: GenerateResponse = read_json(SERVICE, self.timeout, response).await?;
        let text = generated.into_text()?;
        tracing::info!(chars = text.len(), "completion received");
        Ok(text)
    }
}
