use crate::config::Config;
use crate::retry::{with_retry_until, RetryConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl ChatRequest {
    /// Request with `max_tokens` sized for `model` and no sampling overrides.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        let model = model.into();
        Self {
            max_tokens: max_tokens_for_model(&model),
            model,
            messages,
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    /// temperature 0.7, top_p 1, both penalties 0
    pub fn with_default_sampling(mut self) -> Self {
        self.temperature = Some(0.7);
        self.top_p = Some(1.0);
        self.frequency_penalty = Some(0.0);
        self.presence_penalty = Some(0.0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message with a text part followed by an image part.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Raw HTTP outcome of one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Rate limits and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

/// `max_tokens` budget for a model family.
pub fn max_tokens_for_model(model: &str) -> u32 {
    if model.starts_with("gpt-4") {
        4000
    } else if model.starts_with("gpt-3.5-turbo") {
        3000
    } else {
        1000
    }
}

/// Content of the first choice with double quotes removed and whitespace
/// trimmed; `None` when the body has no usable content.
pub fn first_choice_text(body: &str) -> Option<String> {
    let response: ChatResponse = serde_json::from_str(body).ok()?;
    let content = response.choices.into_iter().next()?.message.content?;
    let text = content.replace('"', "").trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Chat completions client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.require_openai_api_key()?,
            &config.openai_api_url,
        ))
    }

    /// One POST to the completions endpoint, whatever the status.
    pub async fn complete(&self, request: &ChatRequest, timeout: Duration) -> Result<ApiResponse> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("Failed to read OpenAI response body")?;

        Ok(ApiResponse { status, body })
    }

    /// Completion with retries on transport errors, 429 and 5xx.
    ///
    /// Whatever response comes last is parsed, so an exhausted retry or a
    /// client error normally yields `None`. A transport error on the last
    /// attempt yields `None` as well.
    pub async fn complete_with_retry(
        &self,
        request: &ChatRequest,
        timeout: Duration,
        retry: &RetryConfig,
        operation_name: &str,
    ) -> Option<String> {
        let outcome = with_retry_until(
            retry,
            operation_name,
            || self.complete(request, timeout),
            |outcome| match outcome {
                Ok(response) => response.is_retryable(),
                Err(e) => {
                    debug!("{}: transport error: {:#}", operation_name, e);
                    true
                }
            },
        )
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!("{}: giving up after transport error: {:#}", operation_name, e);
                return None;
            }
        };

        if response.is_retryable() {
            warn!(
                "{}: still failing with status {} after retries",
                operation_name, response.status
            );
        } else if !response.is_success() {
            warn!(
                "{}: OpenAI API error ({}): {}",
                operation_name, response.status, response.body
            );
        }

        first_choice_text(&response.body)
    }
}
