use crate::traits::LanguageModel;
use crate::{ChatMessage, LlmError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ChatCompletionsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Blocking client for OpenAI-compatible `/chat/completions` endpoints.
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, LlmError> {
        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        ))?;
        let api_key = config
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(endpoint.to_string()))?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model,
            api_key,
            temperature: config.temperature,
        })
    }
}

impl LanguageModel for ChatCompletionsClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(LlmError::BackendResponse {
                backend: self.endpoint.to_string(),
                details: format!("{status}: {text}"),
            });
        }

        let parsed: ChatResponse = response.json()?;
        answer_from_response(parsed)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn answer_from_response(response: ChatResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .ok_or(LlmError::EmptyResponse)
}
