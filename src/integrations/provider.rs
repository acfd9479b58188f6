use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::intent::{classify_locally, parse_intent_json, CommandIntent};
use super::ProviderKind;
use crate::error::GatewayError;

pub const COMMAND_SYSTEM_PROMPT: &str = "Eres el asistente logístico de Litper Pro. \
Clasifica el comando del usuario y responde SOLO con un objeto JSON con las claves \
\"intent\" (track_shipment, generate_report, recommend_carrier, risk_analysis, send_message o unknown), \
\"entities\" (objeto de strings: guide, city, carrier, phone), \
\"confidence\" (0 a 1) y \"reply\" (respuesta breve en español).";

pub const ANALYSIS_SYSTEM_PROMPT: &str = "Eres un analista de logística de última milla en Colombia. \
Responde en español con hallazgos concretos y acciones recomendadas, sin repetir los datos.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A vendor adapter. Every call is a single HTTP request; there is no retry.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn test_connection(&self) -> Result<(), GatewayError>;

    async fn chat(&self, messages: &[ChatMessage], system: Option<&str>)
        -> Result<String, GatewayError>;

    /// Ask the provider for a JSON intent; fall back to keyword matching when
    /// the reply is not usable JSON.
    async fn process_command(&self, command: &str) -> Result<CommandIntent, GatewayError> {
        let reply = self
            .chat(&[ChatMessage::user(command)], Some(COMMAND_SYSTEM_PROMPT))
            .await?;
        Ok(parse_intent_json(&reply).unwrap_or_else(|| {
            let mut intent = classify_locally(command);
            intent.reply = Some(reply);
            intent
        }))
    }

    async fn analyze_data(&self, prompt: &str, data: &Value) -> Result<String, GatewayError> {
        let payload = serde_json::to_string_pretty(data).unwrap_or_default();
        let message = format!("{}\n\nDatos (JSON):\n{}", prompt, payload);
        self.chat(&[ChatMessage::user(message)], Some(ANALYSIS_SYSTEM_PROMPT))
            .await
    }
}

/// Turn a non-success response into `GatewayError::Api`
pub(crate) async fn check_status(
    provider: ProviderKind,
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Api {
            provider: provider.as_str().to_string(),
            status,
            body,
        })
    }
}
