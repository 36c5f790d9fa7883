use serde::{Deserialize, Serialize};

use super::provider::{ChatInput, ChatOutput, LlmError, LlmProvider, LlmResult};
use crate::http::client::HttpClient;

const ERROR_BODY_MAX_CHARS: usize = 400;

/// Provider for any endpoint speaking the OpenAI chat-completions dialect
/// (OpenRouter, OpenAI, local gateways).
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OpenAiCompatProvider {
    pub fn new(
        http: HttpClient,
        api_key: Option<String>,
        model: String,
        base_url: String,
        temperature: f32,
    ) -> LlmResult<Self> {
        let api_key = api_key
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request<'a>(&'a self, input: &'a ChatInput) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &input.system_instruction {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &input.user_message,
        });

        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        }
    }

    fn extract_text(resp: ChatCompletionResponse) -> LlmResult<String> {
        for choice in resp.choices {
            let Some(content) = choice.message.content else {
                continue;
            };
            let text = content.trim();
            if !text.is_empty() {
                return Ok(text.to_string());
            }
        }

        Err(LlmError::EmptyResponse)
    }
}

impl LlmProvider for OpenAiCompatProvider {
    async fn generate(&self, input: ChatInput) -> LlmResult<ChatOutput> {
        let payload = self.build_request(&input);
        let resp = self
            .http
            .post_json(&self.endpoint(), Some(&self.api_key), &payload)
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        if !(200..300).contains(&resp.status) {
            let body = resp.body.chars().take(ERROR_BODY_MAX_CHARS).collect();
            return Err(LlmError::HttpStatus {
                status: resp.status,
                body,
            });
        }

        let parsed = serde_json::from_str::<ChatCompletionResponse>(&resp.body)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        let text = Self::extract_text(parsed)?;
        Ok(ChatOutput { text })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
