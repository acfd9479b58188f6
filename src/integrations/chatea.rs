//! Chatea Pro: WhatsApp CRM with an AI chat endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::provider::{check_status, AiProvider, ChatMessage};
use super::ProviderKind;
use crate::error::GatewayError;

pub const CHATEA_API_URL: &str = "https://chateapro.app/api";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ChatMessage],
}

/// The reply text arrives under one of several field names
#[derive(Debug, Deserialize)]
struct ChatResponse {
    reply: Option<String>,
    message: Option<String>,
    response: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Option<String> {
        self.reply.or(self.message).or(self.response)
    }
}

#[derive(Debug, Serialize)]
struct WhatsAppMessage<'a> {
    phone: &'a str,
    message: &'a str,
}

pub struct ChateaProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ChateaProvider {
    pub fn new(client: reqwest::Client, api_key: &str, base_url: Option<&str>) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(CHATEA_API_URL)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Send a WhatsApp text through the CRM
    pub async fn send_whatsapp(&self, phone: &str, message: &str) -> Result<(), GatewayError> {
        let url = format!("{}/whatsapp/send", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&WhatsAppMessage { phone, message })
            .send()
            .await?;
        check_status(ProviderKind::Chatea, response).await?;
        info!("WhatsApp message sent to {}", phone);
        Ok(())
    }
}

#[async_trait]
impl AiProvider for ChateaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Chatea
    }

    async fn test_connection(&self) -> Result<(), GatewayError> {
        let url = format!("{}/me", self.base_url);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        check_status(ProviderKind::Chatea, response).await?;
        Ok(())
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/ai/chat", self.base_url);
        debug!("POST {} ({} messages)", url, messages.len());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest { system, messages })
            .send()
            .await?;
        let response = check_status(ProviderKind::Chatea, response).await?;

        let body: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse {
                    provider: ProviderKind::Chatea.as_str().to_string(),
                    message: e.to_string(),
                })?;
        body.into_text().ok_or_else(|| GatewayError::InvalidResponse {
            provider: ProviderKind::Chatea.as_str().to_string(),
            message: "reply without text".to_string(),
        })
    }
}
