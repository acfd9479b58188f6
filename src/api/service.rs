//! Shared business logic for the dashboard API
//!
//! Used by the REST handlers and the `litper` CLI.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::analytics::{generate_analytics_report, AnalyticsReport};
use crate::config::AppConfig;
use crate::db::{Store, HISTORICAL_DATA_KEY};
use crate::error::GatewayError;
use crate::import::{import_workbook_bytes, template_data, workbook_bytes, ImportReport};
use crate::insights::{narrate_report, ReportInsights};
use crate::integrations::{
    mask_key, AiFunction, ChatMessage, ChatReply, CommandIntent, IntegrationConfig,
    IntegrationManager, ProviderConfig, ProviderKind, ProviderUpdate,
};
use crate::models::{HistoricalData, ProductType, Shipment};
use crate::recommend::{recommend_best_carrier, CarrierRecommendation};
use crate::risk::{calculate_risk_score, RiskAnalysis};

/// Summary of the stored historical table
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSummary {
    pub cities: usize,
    pub rows: usize,
    pub carriers: Vec<String>,
    pub data: HistoricalData,
}

impl From<HistoricalData> for HistoricalSummary {
    fn from(data: HistoricalData) -> Self {
        Self {
            cities: data.city_count(),
            rows: data.row_count(),
            carriers: data.carriers().into_iter().collect(),
            data,
        }
    }
}

pub struct DashboardService {
    store: Store,
    cached_historical: Arc<RwLock<Option<HistoricalData>>>,
    integrations: RwLock<IntegrationManager>,
}

impl DashboardService {
    pub async fn new(store: Store, config: &AppConfig) -> Result<Self> {
        let integrations = IntegrationManager::load(
            store.clone(),
            config.http_client()?,
            &config.anthropic_model,
            &config.ml_backend_url,
        )
        .await?;
        Ok(Self {
            store,
            cached_historical: Arc::new(RwLock::new(None)),
            integrations: RwLock::new(integrations),
        })
    }

    /// Stored historical table; empty when nothing was imported
    pub async fn historical(&self) -> Result<HistoricalData> {
        {
            let cache = self.cached_historical.read().await;
            if let Some(data) = cache.as_ref() {
                return Ok(data.clone());
            }
        }

        let data: HistoricalData = self.store.get(HISTORICAL_DATA_KEY).await?.unwrap_or_default();
        *self.cached_historical.write().await = Some(data.clone());
        Ok(data)
    }

    /// Parse an uploaded workbook and replace the stored table with it.
    /// Workbook-level failures come back as `ImportError` inside the anyhow error.
    pub async fn import_workbook(&self, bytes: &[u8]) -> Result<ImportReport> {
        let report = import_workbook_bytes(bytes)?;
        self.replace_historical(report.data.clone()).await?;
        info!(
            "Imported {} rows for {} cities ({} issues)",
            report.data.row_count(),
            report.data.city_count(),
            report.issues.len()
        );
        Ok(report)
    }

    pub async fn replace_historical(&self, data: HistoricalData) -> Result<()> {
        self.store.put(HISTORICAL_DATA_KEY, &data).await?;
        *self.cached_historical.write().await = Some(data);
        Ok(())
    }

    pub async fn clear_historical(&self) -> Result<()> {
        self.store.remove(HISTORICAL_DATA_KEY).await?;
        *self.cached_historical.write().await = Some(HistoricalData::new());
        info!("Historical data cleared");
        Ok(())
    }

    pub fn template_workbook(&self) -> Result<Vec<u8>> {
        Ok(workbook_bytes(&template_data())?)
    }

    pub async fn export_workbook(&self) -> Result<Vec<u8>> {
        Ok(workbook_bytes(&self.historical().await?)?)
    }

    pub async fn risk(
        &self,
        city: &str,
        carrier: &str,
        order_value: Option<f64>,
        product_type: ProductType,
    ) -> Result<RiskAnalysis> {
        let historical = self.historical().await?;
        Ok(calculate_risk_score(city, carrier, &historical, order_value, product_type))
    }

    pub async fn recommend(&self, city: &str, product_type: ProductType) -> Result<CarrierRecommendation> {
        let historical = self.historical().await?;
        Ok(recommend_best_carrier(city, &historical, product_type))
    }

    pub fn report(&self, shipments: &[Shipment], top_zones: usize) -> AnalyticsReport {
        generate_analytics_report(shipments, top_zones)
    }

    pub async fn narrate(&self, report: &AnalyticsReport) -> ReportInsights {
        let manager = self.integrations.read().await;
        narrate_report(&manager, report).await
    }

    /// Configuration with API keys masked
    pub async fn integrations(&self) -> IntegrationConfig {
        self.integrations.read().await.config().masked()
    }

    pub async fn update_provider(
        &self,
        kind: ProviderKind,
        update: ProviderUpdate,
    ) -> Result<ProviderConfig, GatewayError> {
        let mut manager = self.integrations.write().await;
        let mut updated = manager.update_provider(kind, update).await?;
        updated.api_key = mask_key(&updated.api_key);
        Ok(updated)
    }

    /// Test a provider without holding the lock across the vendor call
    pub async fn test_provider(&self, kind: ProviderKind) -> Result<ProviderConfig, GatewayError> {
        let adapter = self.integrations.read().await.adapter(kind);
        let outcome = match adapter {
            Ok(adapter) => adapter.test_connection().await,
            Err(e) => Err(e),
        };
        let mut tested = self
            .integrations
            .write()
            .await
            .record_test(kind, outcome)
            .await?;
        tested.api_key = mask_key(&tested.api_key);
        Ok(tested)
    }

    pub async fn assign(
        &self,
        function: AiFunction,
        provider: Option<ProviderKind>,
    ) -> Result<(), GatewayError> {
        self.integrations.write().await.assign(function, provider).await
    }

    pub async fn chat(&self, messages: &[ChatMessage], demo_fallback: bool) -> Result<ChatReply, GatewayError> {
        let manager = self.integrations.read().await;
        if demo_fallback {
            Ok(manager.chat_or_demo(AiFunction::ChatPrincipal, messages).await)
        } else {
            manager.chat(AiFunction::ChatPrincipal, messages).await
        }
    }

    pub async fn command(&self, text: &str) -> CommandIntent {
        self.integrations.read().await.process_command(text).await
    }

    pub async fn send_whatsapp(&self, phone: &str, message: &str) -> Result<(), GatewayError> {
        self.integrations.read().await.send_whatsapp(phone, message).await
    }

    /// Access to the manager for operations not wrapped here
    pub fn integration_manager(&self) -> &RwLock<IntegrationManager> {
        &self.integrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CarrierPerformance;

    async fn service() -> DashboardService {
        let store = Store::in_memory().await.unwrap();
        DashboardService::new(store, &AppConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_historical_defaults_to_empty() {
        let service = service().await;
        assert!(service.historical().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_replaces_and_persists() {
        let service = service().await;
        let bytes = service.template_workbook().unwrap();
        let report = service.import_workbook(&bytes).await.unwrap();
        assert!(report.issues.is_empty());
        assert_eq!(service.historical().await.unwrap(), template_data());

        // a second service over the same store sees the import
        let other = DashboardService::new(service.store.clone(), &AppConfig::default())
            .await
            .unwrap();
        assert_eq!(other.historical().await.unwrap(), template_data());

        service.clear_historical().await.unwrap();
        assert!(service.historical().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_upload_is_import_error() {
        let service = service().await;
        let err = service.import_workbook(b"not a workbook").await.unwrap_err();
        assert!(err.downcast_ref::<crate::error::ImportError>().is_some());
    }

    #[tokio::test]
    async fn test_listing_is_not_blocked_by_provider_test() {
        use axum::extract::State;
        use axum::http::StatusCode;
        use axum::routing::get;
        use axum::Router;
        use crate::integrations::ConnectionStatus;
        use std::time::Duration;
        use tokio::sync::Notify;

        // the vendor answers only once released
        type Gates = Arc<(Notify, Notify)>;
        async fn me(State(gates): State<Gates>) -> StatusCode {
            gates.0.notify_one();
            gates.1.notified().await;
            StatusCode::OK
        }
        let gates: Gates = Arc::new((Notify::new(), Notify::new()));
        let app = Router::new().route("/me", get(me)).with_state(gates.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let service = Arc::new(service().await);
        service
            .update_provider(
                ProviderKind::Chatea,
                ProviderUpdate {
                    api_key: Some("chatea-token-123".into()),
                    enabled: Some(true),
                    base_url: Some(base),
                    model: None,
                },
            )
            .await
            .unwrap();

        let testing = {
            let service = service.clone();
            tokio::spawn(async move { service.test_provider(ProviderKind::Chatea).await })
        };
        gates.0.notified().await;

        let listed = tokio::time::timeout(Duration::from_secs(2), service.integrations()).await;
        assert!(listed.is_ok());

        gates.1.notify_one();
        let tested = testing.await.unwrap().unwrap();
        assert_eq!(tested.status, ConnectionStatus::Connected);
        assert_eq!(tested.api_key, "chat...-123");
    }

    #[tokio::test]
    async fn test_risk_and_recommend_use_stored_data() {
        let service = service().await;
        let mut data = HistoricalData::new();
        data.upsert("CALI", CarrierPerformance::from_counts("TCC", 95, 5, 100, Some(2.0)));
        data.upsert("CALI", CarrierPerformance::from_counts("ENVIA", 60, 40, 100, Some(9.0)));
        service.replace_historical(data).await.unwrap();

        let risk = service.risk("Cali", "tcc", None, ProductType::General).await.unwrap();
        assert!(risk.score < 30.0);

        let rec = service.recommend("cali", ProductType::General).await.unwrap();
        assert_eq!(rec.best.map(|b| b.carrier), Some("TCC".to_string()));
    }
}
