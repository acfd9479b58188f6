//! Narrative for analytics reports

use serde::Serialize;
use tracing::warn;

use crate::analytics::{fallback_summary, AnalyticsReport};
use crate::integrations::{AiFunction, IntegrationManager, ProviderKind};

const REPORT_PROMPT: &str = "Resume este reporte semanal de envíos para el equipo de operaciones. \
Destaca las transportadoras y zonas críticas, las rutas con retraso y tres acciones concretas.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInsights {
    pub text: String,
    /// Provider that wrote the text; `None` for the built-in summary
    pub provider: Option<ProviderKind>,
}

/// Ask the provider assigned to `generar_reportes`, falling back to the
/// fixed summary when it is unavailable.
pub async fn narrate_report(manager: &IntegrationManager, report: &AnalyticsReport) -> ReportInsights {
    if report.total_shipments == 0 {
        return ReportInsights {
            text: fallback_summary(report),
            provider: None,
        };
    }

    let outcome = match serde_json::to_value(report) {
        Ok(data) => manager
            .analyze_data(AiFunction::GenerarReportes, REPORT_PROMPT, &data)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match outcome {
        Ok(reply) => ReportInsights {
            text: reply.text,
            provider: reply.provider,
        },
        Err(e) => {
            warn!("Report narration unavailable, using summary: {}", e);
            ReportInsights {
                text: fallback_summary(report),
                provider: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::generate_analytics_report;
    use crate::db::Store;
    use crate::integrations::ProviderUpdate;
    use crate::models::{ProductType, Shipment, ShipmentStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn shipments() -> Vec<Shipment> {
        ["ENTREGADO", "DEVUELTO", "ENTREGADO"]
            .iter()
            .enumerate()
            .map(|(i, status)| Shipment {
                id: format!("G{}", i),
                carrier: "TCC".to_string(),
                status: ShipmentStatus::from(*status),
                destination: "Calle 1, CALI".to_string(),
                origin: "BOGOTA".to_string(),
                estimated_delivery: None,
                last_update: None,
                order_value: None,
                product_type: ProductType::General,
            })
            .collect()
    }

    async fn manager() -> IntegrationManager {
        let store = Store::in_memory().await.unwrap();
        IntegrationManager::load(store, reqwest::Client::new(), "test-model", "http://ml")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fallback_without_provider() {
        let report = generate_analytics_report(&shipments(), 5);
        let insights = narrate_report(&manager().await, &report).await;
        assert_eq!(insights.provider, None);
        assert_eq!(insights.text, fallback_summary(&report));
    }

    #[tokio::test]
    async fn test_provider_narration() {
        async fn messages(Json(body): Json<Value>) -> Json<Value> {
            let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
            let text = if prompt.contains("totalShipments") {
                "Semana estable en CALI."
            } else {
                "sin datos"
            };
            Json(json!({ "content": [{ "type": "text", "text": text }] }))
        }
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = Router::new().route("/v1/messages", post(messages));
            axum::serve(listener, app).await.unwrap();
        });

        let mut manager = manager().await;
        manager
            .update_provider(
                ProviderKind::Claude,
                ProviderUpdate {
                    api_key: Some("sk-ant-key-for-tests".into()),
                    enabled: Some(true),
                    base_url: Some(format!("http://{}", addr)),
                    model: None,
                },
            )
            .await
            .unwrap();
        manager
            .assign(AiFunction::GenerarReportes, Some(ProviderKind::Claude))
            .await
            .unwrap();

        let report = generate_analytics_report(&shipments(), 5);
        let insights = narrate_report(&manager, &report).await;
        assert_eq!(insights.provider, Some(ProviderKind::Claude));
        assert_eq!(insights.text, "Semana estable en CALI.");
    }
}
