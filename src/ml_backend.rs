//! Client for the ML backend REST service.
//!
//! Field names follow the backend's Spanish JSON. Every type decodes
//! leniently: unknown fields are ignored and missing ones take defaults.

use anyhow::Result;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSummary {
    pub total_envios: u64,
    pub entregados: u64,
    pub en_transito: u64,
    pub con_novedad: u64,
    pub devueltos: u64,
    pub tasa_entrega: f64,
    pub modelo_entrenado: bool,
    pub ultima_actualizacion: Option<String>,
    /// Per-carrier metrics as returned by the backend
    pub transportadoras: Vec<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub transportadora: String,
    pub ciudad_destino: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valor_declarado: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_producto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Prediction {
    pub probabilidad_retraso: f64,
    pub nivel_riesgo: String,
    pub dias_estimados: Option<f64>,
    pub recomendaciones: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadResult {
    #[serde(alias = "success")]
    pub exito: bool,
    pub registros_procesados: u64,
    pub mensaje: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    pub id: Option<String>,
    pub tipo: String,
    pub severidad: String,
    pub mensaje: String,
    pub guia: Option<String>,
    pub fecha: Option<String>,
}

/// `/alertas` answers either a bare list or `{ "alertas": [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AlertsResponse {
    List(Vec<Alert>),
    Wrapped {
        #[serde(default)]
        alertas: Vec<Alert>,
    },
}

pub struct MlBackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl MlBackendClient {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("ML backend request failed: {} - {}", status, text)
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        Self::decode(self.client.get(&url).send().await?).await
    }

    pub async fn dashboard(&self) -> Result<DashboardSummary> {
        self.get("/dashboard").await
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<Prediction> {
        let url = format!("{}/predecir", self.base_url);
        debug!("POST {}", url);
        Self::decode(self.client.post(&url).json(request).send().await?).await
    }

    /// Forward a workbook to the backend for training
    pub async fn upload_excel(&self, bytes: Vec<u8>, filename: &str) -> Result<UploadResult> {
        let url = format!("{}/cargar-excel", self.base_url);
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")?;
        let form = Form::new().part("file", part);
        debug!("POST {} ({})", url, filename);
        Self::decode(self.client.post(&url).multipart(form).send().await?).await
    }

    pub async fn alerts(&self) -> Result<Vec<Alert>> {
        Ok(match self.get::<AlertsResponse>("/alertas").await? {
            AlertsResponse::List(alerts) => alerts,
            AlertsResponse::Wrapped { alertas } => alertas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn dashboard() -> Json<Value> {
        Json(json!({
            "total_envios": 120,
            "entregados": 100,
            "tasa_entrega": 83.3,
            "modelo_entrenado": true,
            "version_modelo": "v2"
        }))
    }

    async fn predecir(Json(body): Json<Value>) -> Json<Value> {
        let riesgo = if body["ciudad_destino"] == "PASTO" { "ALTO" } else { "BAJO" };
        Json(json!({ "probabilidad_retraso": 0.72, "nivel_riesgo": riesgo }))
    }

    async fn cargar_excel(mut multipart: Multipart) -> Json<Value> {
        let mut size = 0;
        let mut name = String::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            name = field.file_name().unwrap_or_default().to_string();
            size += field.bytes().await.unwrap().len();
        }
        Json(json!({ "success": true, "registros_procesados": size, "mensaje": name }))
    }

    async fn alertas() -> Json<Value> {
        Json(json!({ "alertas": [{ "tipo": "retraso", "severidad": "alta", "mensaje": "Guía detenida", "guia": "123" }] }))
    }

    async fn spawn_backend() -> String {
        let app = Router::new()
            .route("/dashboard", get(dashboard))
            .route("/predecir", post(predecir))
            .route("/cargar-excel", post(cargar_excel))
            .route("/alertas", get(alertas));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_dashboard_is_lenient() {
        let client = MlBackendClient::new(&spawn_backend().await, reqwest::Client::new());
        let summary = client.dashboard().await.unwrap();
        assert_eq!(summary.total_envios, 120);
        assert_eq!(summary.devueltos, 0);
        assert!(summary.modelo_entrenado);
        assert_eq!(summary.extra.get("version_modelo"), Some(&json!("v2")));
    }

    #[tokio::test]
    async fn test_predict() {
        let client = MlBackendClient::new(&spawn_backend().await, reqwest::Client::new());
        let prediction = client
            .predict(&PredictionRequest {
                transportadora: "ENVIA".into(),
                ciudad_destino: "PASTO".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(prediction.nivel_riesgo, "ALTO");
        assert!(prediction.recomendaciones.is_empty());
    }

    #[tokio::test]
    async fn test_upload_and_alerts() {
        let client = MlBackendClient::new(&spawn_backend().await, reqwest::Client::new());
        let result = client.upload_excel(vec![1, 2, 3, 4], "datos.xlsx").await.unwrap();
        assert!(result.exito);
        assert_eq!(result.registros_procesados, 4);
        assert_eq!(result.mensaje.as_deref(), Some("datos.xlsx"));

        let alerts = client.alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].guia.as_deref(), Some("123"));
        assert_eq!(alerts[0].fecha, None);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let client = MlBackendClient::new(&spawn_backend().await, reqwest::Client::new());
        let err = client.get::<Value>("/no-existe").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
