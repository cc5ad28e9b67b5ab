//! OpenAI-compatible chat-completions judge.

use super::{Judge, JudgeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the OpenAI judge.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Connection-level timeout; the engine applies its own per-call
    /// deadline on top.
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Judge backed by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug)]
pub struct OpenAiJudge {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiJudge {
    pub fn new(config: OpenAiConfig) -> Result<Self, JudgeError> {
        if config.api_key.is_empty() {
            return Err(JudgeError::NotConfigured(
                "OPENAI_API_KEY not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| JudgeError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
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
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl Judge for OpenAiJudge {
    async fn judge(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, JudgeError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeError::Timeout(self.config.timeout)
                } else {
                    JudgeError::Transport(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(JudgeError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(JudgeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::Output(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| JudgeError::Output("empty completion".to_string()))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_rejected() {
        let err = OpenAiJudge::new(OpenAiConfig::default()).unwrap_err();
        assert!(matches!(err, JudgeError::NotConfigured(_)));
    }

    #[test]
    fn configured_judge_reports_model() {
        let judge = OpenAiJudge::new(OpenAiConfig {
            api_key: "sk-test".into(),
            ..OpenAiConfig::default()
        })
        .unwrap();
        assert_eq!(judge.model(), "gpt-4o-mini");
    }

    #[test]
    fn transport_errors_are_retryable_output_errors_are_not() {
        assert!(JudgeError::Transport("reset".into()).is_transport());
        assert!(JudgeError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(JudgeError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_transport());
        assert!(!JudgeError::Api {
            status: 401,
            message: "unauthorized".into()
        }
        .is_transport());
        assert!(!JudgeError::Output("not json".into()).is_transport());
    }
}
