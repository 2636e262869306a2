// src/llm/openai_client.rs
use super::{analysis_context, AnalysisAssistant, LlmError, SYSTEM_PROMPT};
use crate::config::OpenAiConfig;
use crate::models::AnalysisResult;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    max_retry_time: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(60),
            max_retry_time: Duration::from_secs(120),
        }
    }

    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            timeout: config.timeout,
            ..Self::new(config.api_key.clone())
        }
    }

    pub fn with_max_retry_time(mut self, max_retry_time: Duration) -> Self {
        self.max_retry_time = max_retry_time;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(&self, question: &str, analysis: &AnalysisResult) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OpenAiMessage {
                    role: "system".to_string(),
                    content: analysis_context(analysis),
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: question.to_string(),
                },
            ],
            temperature: Some(0.3),
        }
    }

    pub async fn chat_completion(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError> {
        tracing::debug!("OpenAI request: model={}, {} messages", request.model, request.messages.len());

        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_retry_time),
            ..Default::default()
        };

        // Connection errors and 429/5xx gateway errors are retried; everything else is permanent.
        let operation = || async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("OpenAI connection error (retrying): {}", e);
                        backoff::Error::transient(LlmError::Request(e.to_string()))
                    } else {
                        tracing::error!("OpenAI request error: {}", e);
                        backoff::Error::permanent(LlmError::Request(e.to_string()))
                    }
                })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(LlmError::Request(e.to_string())))?;

            if matches!(status.as_u16(), 429 | 500 | 502 | 503) {
                tracing::warn!("OpenAI returned {} (retrying)", status);
                return Err(backoff::Error::transient(LlmError::Api {
                    status: status.as_u16(),
                    body,
                }));
            }

            if !status.is_success() {
                tracing::error!("OpenAI permanent error ({}): {}", status, body);
                return Err(backoff::Error::permanent(LlmError::Api {
                    status: status.as_u16(),
                    body,
                }));
            }

            serde_json::from_str::<ChatCompletionResponse>(&body)
                .map_err(|e| backoff::Error::permanent(LlmError::Parse(e.to_string())))
        };

        retry(backoff_config, operation).await
    }
}

#[async_trait]
impl AnalysisAssistant for OpenAiClient {
    async fn ask(&self, question: &str, analysis: &AnalysisResult) -> Result<String, LlmError> {
        let request = self.build_request(question, analysis);
        let response = self.chat_completion(&request).await?;

        if let Some(usage) = &response.usage {
            tracing::info!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }

        first_answer(response)
    }
}

fn first_answer(response: ChatCompletionResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
        .ok_or(LlmError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioVolume;

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            audio_volume: AudioVolume {
                volume_interpretation: "Too quiet".to_string(),
            },
            transcription: "Hello world".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_request_carries_question_and_context() {
        let client = OpenAiClient::new("sk-test".to_string());
        let request = client.build_request("What was my volume level?", &analysis());

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].content, SYSTEM_PROMPT);
        assert!(request.messages[1].content.contains("Too quiet"));
        let last = request.messages.last().unwrap();
        assert_eq!(last.role, "user");
        assert_eq!(last.content, "What was my volume level?");
    }

    #[test]
    fn test_from_config() {
        let client = OpenAiClient::from_config(&OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://localhost:9000/v1".to_string(),
            model: "gpt-4o".to_string(),
            timeout: Duration::from_secs(5),
        });
        assert_eq!(client.model(), "gpt-4o");
        assert_eq!(client.base_url, "http://localhost:9000/v1");
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_first_answer() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Your volume was too quiet. "}}],
                "usage":{"prompt_tokens":120,"completion_tokens":8,"total_tokens":128}}"#,
        )
        .unwrap();
        assert_eq!(first_answer(response).unwrap(), "Your volume was too quiet.");

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_answer(empty), Err(LlmError::EmptyResponse)));

        let null_content: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(matches!(first_answer(null_content), Err(LlmError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_request_error() {
        let client = OpenAiClient::from_config(&OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(1),
        })
        .with_max_retry_time(Duration::from_millis(1));

        let err = client.ask("Hi?", &analysis()).await.unwrap_err();
        assert!(matches!(err, LlmError::Request(_)));
    }
}
