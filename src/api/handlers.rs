//! REST API handlers for the Litper Pro dashboard
//!
//! These handlers use the shared DashboardService.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::service::{DashboardService, HistoricalSummary};
use crate::analytics::{AnalyticsReport, DEFAULT_TOP_ZONES};
use crate::error::{GatewayError, ImportError};
use crate::import::ImportIssue;
use crate::insights::ReportInsights;
use crate::integrations::{
    AiFunction, ChatMessage, ChatReply, CommandIntent, IntegrationConfig, ProviderConfig,
    ProviderKind, ProviderUpdate,
};
use crate::models::{ProductType, Shipment};
use crate::recommend::CarrierRecommendation;
use crate::risk::RiskAnalysis;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl ToString) -> ApiError {
    (status, Json(ErrorResponse { error: message.to_string() }))
}

fn internal(e: anyhow::Error) -> ApiError {
    error(StatusCode::INTERNAL_SERVER_ERROR, e)
}

fn gateway(e: GatewayError) -> ApiError {
    let status = match &e {
        GatewayError::NoProviderAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::ProviderNotConfigured(_) | GatewayError::MissingApiKey(_) => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::Http(_) | GatewayError::Api { .. } | GatewayError::InvalidResponse { .. } => {
            StatusCode::BAD_GATEWAY
        }
        GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error(status, e)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub cities: usize,
    pub rows: usize,
    pub issues: Vec<ImportIssue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRequest {
    pub city: String,
    pub carrier: String,
    pub order_value: Option<f64>,
    #[serde(default)]
    pub product_type: ProductType,
}

#[derive(Deserialize)]
pub struct RecommendQuery {
    pub product_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub shipments: Vec<Shipment>,
    pub top_zones: Option<usize>,
}

#[derive(Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub insights: bool,
}

#[derive(Serialize)]
pub struct ReportResponse {
    pub report: AnalyticsReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<ReportInsights>,
}

#[derive(Deserialize)]
pub struct AssignmentRequest {
    pub provider: Option<ProviderKind>,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Answer with the demo text instead of an error when no provider responds
    #[serde(default = "default_true")]
    pub demo_fallback: bool,
}

#[derive(Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Deserialize)]
pub struct WhatsAppRequest {
    pub phone: String,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub type AppState = Arc<DashboardService>;

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/v1/historical
pub async fn get_historical(
    State(service): State<AppState>,
) -> Result<Json<HistoricalSummary>, ApiError> {
    match service.historical().await {
        Ok(data) => Ok(Json(HistoricalSummary::from(data))),
        Err(e) => Err(internal(e)),
    }
}

/// POST /api/v1/historical/upload (xlsx body)
pub async fn upload_historical(
    State(service): State<AppState>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    if body.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "El archivo está vacío"));
    }
    match service.import_workbook(&body).await {
        Ok(report) => Ok(Json(UploadResponse {
            cities: report.data.city_count(),
            rows: report.data.row_count(),
            issues: report.issues,
        })),
        Err(e) if e.downcast_ref::<ImportError>().is_some() => {
            Err(error(StatusCode::UNPROCESSABLE_ENTITY, e))
        }
        Err(e) => Err(internal(e)),
    }
}

fn xlsx_download(filename: &str, bytes: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
}

/// GET /api/v1/historical/template
pub async fn get_template(
    State(service): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = service.template_workbook().map_err(internal)?;
    Ok(xlsx_download("plantilla_litper.xlsx", bytes))
}

/// GET /api/v1/historical/export
pub async fn export_historical(
    State(service): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = service.export_workbook().await.map_err(internal)?;
    Ok(xlsx_download("historico_litper.xlsx", bytes))
}

/// DELETE /api/v1/historical
pub async fn delete_historical(State(service): State<AppState>) -> Result<StatusCode, ApiError> {
    service.clear_historical().await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/risk
pub async fn post_risk(
    State(service): State<AppState>,
    Json(request): Json<RiskRequest>,
) -> Result<Json<RiskAnalysis>, ApiError> {
    if request.city.trim().is_empty() || request.carrier.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "city y carrier son obligatorios"));
    }
    service
        .risk(&request.city, &request.carrier, request.order_value, request.product_type)
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /api/v1/recommend/:city
pub async fn get_recommendation(
    State(service): State<AppState>,
    Path(city): Path<String>,
    Query(params): Query<RecommendQuery>,
) -> Result<Json<CarrierRecommendation>, ApiError> {
    let product_type = params
        .product_type
        .as_deref()
        .map(ProductType::from)
        .unwrap_or_default();
    service
        .recommend(&city, product_type)
        .await
        .map(Json)
        .map_err(internal)
}

/// POST /api/v1/report
pub async fn post_report(
    State(service): State<AppState>,
    Query(params): Query<ReportQuery>,
    Json(request): Json<ReportRequest>,
) -> Json<ReportResponse> {
    let report = service.report(
        &request.shipments,
        request.top_zones.unwrap_or(DEFAULT_TOP_ZONES),
    );
    let insights = if params.insights {
        Some(service.narrate(&report).await)
    } else {
        None
    };
    Json(ReportResponse { report, insights })
}

/// GET /api/v1/integrations
pub async fn get_integrations(State(service): State<AppState>) -> Json<IntegrationConfig> {
    Json(service.integrations().await)
}

fn parse_provider(raw: &str) -> Result<ProviderKind, ApiError> {
    raw.parse::<ProviderKind>()
        .map_err(|_| error(StatusCode::NOT_FOUND, format!("Proveedor desconocido: {}", raw)))
}

/// PUT /api/v1/integrations/providers/:provider
pub async fn put_provider(
    State(service): State<AppState>,
    Path(provider): Path<String>,
    Json(update): Json<ProviderUpdate>,
) -> Result<Json<ProviderConfig>, ApiError> {
    let kind = parse_provider(&provider)?;
    service.update_provider(kind, update).await.map(Json).map_err(gateway)
}

/// POST /api/v1/integrations/providers/:provider/test
pub async fn test_provider(
    State(service): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<ProviderConfig>, ApiError> {
    let kind = parse_provider(&provider)?;
    service.test_provider(kind).await.map(Json).map_err(gateway)
}

/// PUT /api/v1/integrations/assignments/:function
pub async fn put_assignment(
    State(service): State<AppState>,
    Path(function): Path<String>,
    Json(request): Json<AssignmentRequest>,
) -> Result<StatusCode, ApiError> {
    let function: AiFunction = function
        .parse()
        .map_err(|e: String| error(StatusCode::NOT_FOUND, e))?;
    service
        .assign(function, request.provider)
        .await
        .map_err(gateway)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/chat
pub async fn post_chat(
    State(service): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "El mensaje está vacío"));
    }
    let mut messages = request.history;
    messages.push(ChatMessage::user(request.message));
    service
        .chat(&messages, request.demo_fallback)
        .await
        .map(Json)
        .map_err(gateway)
}

/// POST /api/v1/command
pub async fn post_command(
    State(service): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Json<CommandIntent> {
    Json(service.command(&request.command).await)
}

/// POST /api/v1/whatsapp
pub async fn post_whatsapp(
    State(service): State<AppState>,
    Json(request): Json<WhatsAppRequest>,
) -> Result<StatusCode, ApiError> {
    service
        .send_whatsapp(&request.phone, &request.message)
        .await
        .map_err(gateway)?;
    Ok(StatusCode::ACCEPTED)
}
