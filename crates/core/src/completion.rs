use crate::http::{endpoint, ensure_success};
use crate::traits::CompletionModel;
use crate::{ChatMessage, ServiceError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_HUGGINGFACE_MODEL: &str = "google/flan-t5-large";
pub const DEFAULT_HUGGINGFACE_BASE_URL: &str = "https://api-inference.huggingface.co";

pub struct OpenAiChatModel {
    base_url: Url,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAiChatModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let url = endpoint(&self.base_url, "chat/completions")?;
        debug!(%url, model = %self.model, "requesting chat completion");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
                temperature: 0.0,
            })
            .send()
            .await?;
        let response = ensure_success(response, "openai").await?;

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ServiceError::Request("completion returned no choices".to_string()))
    }
}

/// Text-to-text models on the hosted inference API. Chat messages are
/// flattened into a single prompt since these models take plain input.
pub struct HuggingFaceModel {
    base_url: Url,
    api_token: String,
    repo_id: String,
    max_length: u32,
    client: Client,
}

impl HuggingFaceModel {
    pub fn new(
        base_url: &str,
        api_token: impl Into<String>,
        repo_id: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            api_token: api_token.into(),
            repo_id: repo_id.into(),
            max_length: 512,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl CompletionModel for HuggingFaceModel {
    fn model(&self) -> &str {
        &self.repo_id
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let url = endpoint(&self.base_url, &format!("models/{}", self.repo_id))?;
        debug!(%url, "requesting text generation");

        let inputs = messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(&json!({
                "inputs": inputs,
                "parameters": { "temperature": 0.0, "max_length": self.max_length },
            }))
            .send()
            .await?;
        let response = ensure_success(response, "huggingface").await?;

        let parsed: Value = response.json().await?;
        let generated = parsed
            .pointer("/0/generated_text")
            .or_else(|| parsed.pointer("/generated_text"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ServiceError::Request(format!("unexpected text generation payload: {parsed}"))
            })?;

        Ok(generated.trim().to_string())
    }
}
