//! OpenAI-compatible `/chat/completions` classifier client

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Classifier;
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::prompts::ClassifierPrompt;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Classifier backed by a hosted chat-completions endpoint.
pub struct ChatCompletionsClassifier {
    http: reqwest::Client,
    config: ClassifierConfig,
}

impl ChatCompletionsClassifier {
    /// Build a client with the configured hard timeout.
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        if config.endpoint_url.trim().is_empty() {
            return Err(ClassifierError::Config("endpoint_url is empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClassifierError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn request_body<'a>(&'a self, prompt: &'a ClassifierPrompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl Classifier for ChatCompletionsClassifier {
    async fn classify(&self, prompt: &ClassifierPrompt) -> Result<String, ClassifierError> {
        let started = Instant::now();
        let mut request = self
            .http
            .post(&self.config.endpoint_url)
            .json(&self.request_body(prompt));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Classifier returned non-success status");
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| self.map_transport(e))?;
        let content = extract_content(chat_response)?;

        debug!(
            model = %self.config.model,
            latency_ms = started.elapsed().as_millis() as u64,
            chars = content.len(),
            "Classifier responded"
        );
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

impl ChatCompletionsClassifier {
    fn map_transport(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout {
                after_ms: self.config.timeout_ms,
            }
        } else {
            ClassifierError::Request(e.to_string())
        }
    }
}

fn extract_content(response: ChatResponse) -> Result<String, ClassifierError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ClassifierError::EmptyContent)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
