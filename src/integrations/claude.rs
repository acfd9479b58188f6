use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::{check_status, AiProvider, ChatMessage, ChatRole};
use super::ProviderKind;
use crate::error::GatewayError;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(client: reqwest::Client, api_key: &str, base_url: Option<&str>, model: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(ANTHROPIC_API_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
        }
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        max_tokens: u32,
    ) -> Result<String, GatewayError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: match m.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                    },
                    content: &m.content,
                })
                .collect(),
        };

        let url = format!("{}/v1/messages", self.base_url);
        debug!("POST {} ({} messages)", url, messages.len());
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;
        let response = check_status(ProviderKind::Claude, response).await?;

        let body: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse {
                    provider: ProviderKind::Claude.as_str().to_string(),
                    message: e.to_string(),
                })?;

        let text: Vec<String> = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(GatewayError::InvalidResponse {
                provider: ProviderKind::Claude.as_str().to_string(),
                message: "respuesta sin bloques de texto".to_string(),
            });
        }
        Ok(text.join("\n"))
    }
}

#[async_trait]
impl AiProvider for ClaudeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    async fn test_connection(&self) -> Result<(), GatewayError> {
        self.send(&[ChatMessage::user("ping")], None, 16).await?;
        Ok(())
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
    ) -> Result<String, GatewayError> {
        self.send(messages, system, DEFAULT_MAX_TOKENS).await
    }
}
