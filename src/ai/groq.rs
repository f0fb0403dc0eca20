use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::judge::{build_prompt, parse_judgement, JudgeError, RelevanceJudge};
use super::retry::{with_backoff, BackoffPolicy};
use crate::config::JudgeConfig;
use crate::error::{AppError, Result};
use crate::models::{Article, Judgement};

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Relevance judge backed by Groq's OpenAI-compatible chat API.
pub struct GroqJudge {
    client: Client,
    api_key: String,
    model: String,
    policy: BackoffPolicy,
}

impl GroqJudge {
    pub fn new(api_key: String, config: &JudgeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            policy: BackoffPolicy {
                max_attempts: config.max_attempts,
                base_delay: Duration::from_millis(config.base_delay_ms),
            },
        })
    }

    /// One chat completion; returns the raw message content.
    async fn complete(&self, prompt: &str) -> std::result::Result<String, JudgeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(GROQ_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("API error {status}: {error_text}");
            return Err(if is_retryable_status(status) {
                JudgeError::transient(message)
            } else {
                JudgeError::fatal(message)
            });
        }

        let body = response.text().await.map_err(classify_transport_error)?;
        let chat: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| JudgeError::malformed(format!("invalid completion envelope: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| JudgeError::malformed("completion has no content"))
    }
}

#[async_trait]
impl RelevanceJudge for GroqJudge {
    async fn judge(
        &self,
        article: &Article,
        profile_text: &str,
    ) -> std::result::Result<Judgement, JudgeError> {
        let prompt = build_prompt(article, profile_text);
        let content = with_backoff(&self.policy, || self.complete(&prompt)).await?;
        parse_judgement(&content)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn classify_transport_error(err: reqwest::Error) -> JudgeError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        JudgeError::transient(err.to_string())
    } else if err.is_decode() {
        JudgeError::malformed(err.to_string())
    } else {
        JudgeError::fatal(err.to_string())
    }
}
