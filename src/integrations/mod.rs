//! AI provider and data-source integrations
//!
//! The manager owns the persisted configuration (`litper_integrations`) and
//! routes each dashboard function to a provider adapter.

pub mod chatea;
pub mod claude;
pub mod intent;
pub mod provider;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::db::{Store, INTEGRATIONS_KEY};
use crate::error::GatewayError;
use crate::ml_backend::MlBackendClient;

pub use chatea::ChateaProvider;
pub use claude::ClaudeProvider;
pub use intent::{classify_locally, CommandIntent, IntentKind};
pub use provider::{AiProvider, ChatMessage, ChatRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Claude,
    Chatea,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Claude, ProviderKind::Chatea];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Chatea => "chatea",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "Claude (Anthropic)",
            ProviderKind::Chatea => "Chatea Pro",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            "chatea" | "chatea_pro" => Ok(ProviderKind::Chatea),
            other => Err(GatewayError::ProviderNotConfigured(other.to_string())),
        }
    }
}

/// Dashboard features that can be routed to a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiFunction {
    ChatPrincipal,
    AnalisisDatos,
    ProcesarComandos,
    GenerarReportes,
}

impl AiFunction {
    pub const ALL: [AiFunction; 4] = [
        AiFunction::ChatPrincipal,
        AiFunction::AnalisisDatos,
        AiFunction::ProcesarComandos,
        AiFunction::GenerarReportes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AiFunction::ChatPrincipal => "chat_principal",
            AiFunction::AnalisisDatos => "analisis_datos",
            AiFunction::ProcesarComandos => "procesar_comandos",
            AiFunction::GenerarReportes => "generar_reportes",
        }
    }
}

impl fmt::Display for AiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        AiFunction::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Función desconocida: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub status: ConnectionStatus,
    #[serde(default)]
    pub last_tested: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: String::new(),
            enabled: false,
            base_url: None,
            model: None,
            status: ConnectionStatus::Disconnected,
            last_tested: None,
            last_error: None,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    MlBackend,
    ChateaCrm,
    Excel,
}

impl FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ml_backend" | "ml" => Ok(DataSourceKind::MlBackend),
            "chatea_crm" | "crm" => Ok(DataSourceKind::ChateaCrm),
            "excel" => Ok(DataSourceKind::Excel),
            other => Err(format!("Fuente de datos desconocida: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConnection {
    pub kind: DataSourceKind,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub status: ConnectionStatus,
    #[serde(default)]
    pub last_tested: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub connections: Vec<DataSourceConnection>,
    #[serde(default)]
    pub assignments: BTreeMap<AiFunction, ProviderKind>,
}

impl IntegrationConfig {
    pub fn with_ml_backend(ml_backend_url: &str) -> Self {
        Self {
            providers: ProviderKind::ALL.into_iter().map(ProviderConfig::new).collect(),
            connections: vec![
                DataSourceConnection {
                    kind: DataSourceKind::MlBackend,
                    name: "Backend ML".to_string(),
                    url: Some(ml_backend_url.to_string()),
                    enabled: true,
                    status: ConnectionStatus::Disconnected,
                    last_tested: None,
                },
                DataSourceConnection {
                    kind: DataSourceKind::ChateaCrm,
                    name: "Chatea CRM".to_string(),
                    url: None,
                    enabled: false,
                    status: ConnectionStatus::Disconnected,
                    last_tested: None,
                },
                DataSourceConnection {
                    kind: DataSourceKind::Excel,
                    name: "Excel".to_string(),
                    url: None,
                    enabled: true,
                    status: ConnectionStatus::Connected,
                    last_tested: None,
                },
            ],
            assignments: BTreeMap::new(),
        }
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// Get or create the entry for a provider
    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        let index = match self.providers.iter().position(|p| p.kind == kind) {
            Some(index) => index,
            None => {
                self.providers.push(ProviderConfig::new(kind));
                self.providers.len() - 1
            }
        };
        &mut self.providers[index]
    }

    pub fn connection_mut(&mut self, kind: DataSourceKind) -> Option<&mut DataSourceConnection> {
        self.connections.iter_mut().find(|c| c.kind == kind)
    }

    /// Assigned and enabled provider first, then the first connected one
    pub fn resolve(&self, function: AiFunction) -> Result<ProviderKind, GatewayError> {
        if let Some(kind) = self.assignments.get(&function) {
            if self.provider(*kind).is_some_and(ProviderConfig::is_usable) {
                return Ok(*kind);
            }
        }
        self.providers
            .iter()
            .find(|p| p.is_usable() && p.status == ConnectionStatus::Connected)
            .map(|p| p.kind)
            .ok_or_else(|| GatewayError::NoProviderAvailable(function.to_string()))
    }

    /// Copy with API keys masked, for listing
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        for provider in &mut copy.providers {
            provider.api_key = mask_key(&provider.api_key);
        }
        copy
    }
}

pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "*".repeat(n),
        n => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{}...{}", head, tail)
        }
    }
}

/// Partial update of a provider entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUpdate {
    pub api_key: Option<String>,
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    /// `None` for the canned demo reply
    pub provider: Option<ProviderKind>,
    pub text: String,
}

pub fn demo_reply(message: &str) -> String {
    format!(
        "Modo demostración: no hay un proveedor de IA conectado. \
         Recibí tu mensaje \"{}\". Configura una API key en Integraciones \
         para obtener respuestas reales sobre tus envíos.",
        message.trim()
    )
}

pub struct IntegrationManager {
    store: Store,
    config: IntegrationConfig,
    client: reqwest::Client,
    default_model: String,
}

impl IntegrationManager {
    /// Load the saved configuration, or start from defaults
    pub async fn load(
        store: Store,
        client: reqwest::Client,
        default_model: &str,
        ml_backend_url: &str,
    ) -> anyhow::Result<Self> {
        let config = match store.get::<IntegrationConfig>(INTEGRATIONS_KEY).await? {
            Some(config) => config,
            None => IntegrationConfig::with_ml_backend(ml_backend_url),
        };
        Ok(Self {
            store,
            config,
            client,
            default_model: default_model.to_string(),
        })
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    async fn save(&self) -> Result<(), GatewayError> {
        self.store
            .put(INTEGRATIONS_KEY, &self.config)
            .await
            .map_err(|e| GatewayError::Store(e.to_string()))
    }

    pub async fn update_provider(
        &mut self,
        kind: ProviderKind,
        update: ProviderUpdate,
    ) -> Result<ProviderConfig, GatewayError> {
        let provider = self.config.provider_mut(kind);
        if let Some(key) = update.api_key {
            let key = key.trim().to_string();
            if key != provider.api_key {
                provider.api_key = key;
                provider.status = ConnectionStatus::Disconnected;
                provider.last_error = None;
            }
        }
        if let Some(enabled) = update.enabled {
            provider.enabled = enabled;
        }
        if let Some(url) = update.base_url {
            provider.base_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(model) = update.model {
            provider.model = Some(model).filter(|m| !m.trim().is_empty());
        }
        let updated = provider.clone();
        self.save().await?;
        info!("Updated provider {}", kind);
        Ok(updated)
    }

    /// `None` removes the assignment
    pub async fn assign(
        &mut self,
        function: AiFunction,
        provider: Option<ProviderKind>,
    ) -> Result<(), GatewayError> {
        match provider {
            Some(kind) => {
                self.config.provider_mut(kind);
                self.config.assignments.insert(function, kind);
            }
            None => {
                self.config.assignments.remove(&function);
            }
        }
        self.save().await
    }

    fn chatea(&self) -> Result<ChateaProvider, GatewayError> {
        let config = self
            .config
            .provider(ProviderKind::Chatea)
            .ok_or_else(|| GatewayError::ProviderNotConfigured(ProviderKind::Chatea.to_string()))?;
        if config.api_key.is_empty() {
            return Err(GatewayError::MissingApiKey(ProviderKind::Chatea.to_string()));
        }
        Ok(ChateaProvider::new(
            self.client.clone(),
            &config.api_key,
            config.base_url.as_deref(),
        ))
    }

    /// Build the adapter for a provider from its saved configuration
    pub fn adapter(&self, kind: ProviderKind) -> Result<Box<dyn AiProvider>, GatewayError> {
        let config = self
            .config
            .provider(kind)
            .ok_or_else(|| GatewayError::ProviderNotConfigured(kind.to_string()))?;
        if config.api_key.is_empty() {
            return Err(GatewayError::MissingApiKey(kind.to_string()));
        }
        Ok(match kind {
            ProviderKind::Claude => Box::new(ClaudeProvider::new(
                self.client.clone(),
                &config.api_key,
                config.base_url.as_deref(),
                config.model.as_deref().unwrap_or(&self.default_model),
            )),
            ProviderKind::Chatea => Box::new(self.chatea()?),
        })
    }

    /// Test a provider and record the outcome
    pub async fn test_provider(&mut self, kind: ProviderKind) -> Result<ProviderConfig, GatewayError> {
        let outcome = match self.adapter(kind) {
            Ok(adapter) => adapter.test_connection().await,
            Err(e) => Err(e),
        };
        self.record_test(kind, outcome).await
    }

    /// Store the result of a connection test run elsewhere
    pub async fn record_test(
        &mut self,
        kind: ProviderKind,
        outcome: Result<(), GatewayError>,
    ) -> Result<ProviderConfig, GatewayError> {
        let provider = self.config.provider_mut(kind);
        provider.last_tested = Some(Utc::now());
        match outcome {
            Ok(()) => {
                info!("Provider {} connected", kind);
                provider.status = ConnectionStatus::Connected;
                provider.last_error = None;
            }
            Err(e) => {
                warn!("Provider {} test failed: {}", kind, e);
                provider.status = ConnectionStatus::Error;
                provider.last_error = Some(e.to_string());
            }
        }
        let tested = provider.clone();
        self.save().await?;
        Ok(tested)
    }

    /// Test a data-source connection and record its status
    pub async fn test_data_source(
        &mut self,
        kind: DataSourceKind,
    ) -> Result<ConnectionStatus, GatewayError> {
        let ok = match kind {
            DataSourceKind::Excel => true,
            DataSourceKind::ChateaCrm => match self.chatea() {
                Ok(chatea) => chatea.test_connection().await.is_ok(),
                Err(_) => false,
            },
            DataSourceKind::MlBackend => {
                let url = self
                    .config
                    .connections
                    .iter()
                    .find(|c| c.kind == DataSourceKind::MlBackend)
                    .and_then(|c| c.url.clone());
                match url {
                    Some(url) => MlBackendClient::new(&url, self.client.clone())
                        .dashboard()
                        .await
                        .is_ok(),
                    None => false,
                }
            }
        };

        let status = if ok {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Error
        };
        if let Some(connection) = self.config.connection_mut(kind) {
            connection.status = status;
            connection.last_tested = Some(Utc::now());
        }
        self.save().await?;
        Ok(status)
    }

    pub async fn chat(
        &self,
        function: AiFunction,
        messages: &[ChatMessage],
    ) -> Result<ChatReply, GatewayError> {
        let adapter = self.adapter(self.config.resolve(function)?)?;
        debug!("{} -> {}", function, adapter.kind());
        let text = adapter.chat(messages, None).await?;
        Ok(ChatReply {
            provider: Some(adapter.kind()),
            text,
        })
    }

    /// Chat, answering with the demo text when no provider can
    pub async fn chat_or_demo(&self, function: AiFunction, messages: &[ChatMessage]) -> ChatReply {
        match self.chat(function, messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat via {} failed, using demo reply: {}", function, e);
                let last = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == ChatRole::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                ChatReply {
                    provider: None,
                    text: demo_reply(last),
                }
            }
        }
    }

    /// Classify a free-text command. Without a provider the keyword
    /// classifier answers.
    pub async fn process_command(&self, command: &str) -> CommandIntent {
        let attempt = match self.config.resolve(AiFunction::ProcesarComandos) {
            Ok(kind) => match self.adapter(kind) {
                Ok(adapter) => adapter.process_command(command).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        attempt.unwrap_or_else(|e| {
            warn!("Command classification via provider failed: {}", e);
            classify_locally(command)
        })
    }

    pub async fn analyze_data(
        &self,
        function: AiFunction,
        prompt: &str,
        data: &Value,
    ) -> Result<ChatReply, GatewayError> {
        let adapter = self.adapter(self.config.resolve(function)?)?;
        debug!("{} -> {}", function, adapter.kind());
        let text = adapter.analyze_data(prompt, data).await?;
        Ok(ChatReply {
            provider: Some(adapter.kind()),
            text,
        })
    }

    pub async fn send_whatsapp(&self, phone: &str, message: &str) -> Result<(), GatewayError> {
        self.chatea()?.send_whatsapp(phone, message).await
    }
}
