//! REST API tests against an in-memory store

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use litper_pro::api::{create_rest_router, DashboardService};
use litper_pro::config::AppConfig;
use litper_pro::db::Store;
use litper_pro::import::{template_data, workbook_bytes};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let store = Store::in_memory().await.unwrap();
    let config = AppConfig {
        ml_backend_url: "http://127.0.0.1:9".to_string(),
        ..AppConfig::default()
    };
    let service = DashboardService::new(store, &config).await.unwrap();
    create_rest_router(Arc::new(service))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn upload(app: &Router, bytes: Vec<u8>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/historical/upload")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_check() {
    let app = app().await;
    let (status, body) = get_json(&app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn upload_then_query_historical() {
    let app = app().await;

    let (status, body) = get_json(&app, "/api/v1/historical").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 0);

    let (status, body) = upload(&app, workbook_bytes(&template_data()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 6);
    assert_eq!(body["cities"], 4);
    assert_eq!(body["issues"].as_array().map(Vec::len), Some(0));

    let (_, body) = get_json(&app, "/api/v1/historical").await;
    assert_eq!(body["cities"], 4);
    assert_eq!(body["data"]["BOGOTA"][0]["carrier"], "SERVIENTREGA");
    assert_eq!(body["data"]["BOGOTA"][0]["deliveryRate"], 85.0);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/historical")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = get_json(&app, "/api/v1/historical").await;
    assert_eq!(body["rows"], 0);
}

#[tokio::test]
async fn upload_rejects_bad_workbooks() {
    let app = app().await;

    let (status, _) = upload(&app, Vec::new()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = upload(&app, b"plain text".to_vec()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn template_download_is_xlsx() {
    let app = app().await;
    let request = Request::builder()
        .uri("/api/v1/historical/template")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.contains("spreadsheetml"));
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    // xlsx files are zip archives
    assert_eq!(&body[..2], b"PK");
}

#[tokio::test]
async fn risk_and_recommendation() {
    let app = app().await;
    upload(&app, workbook_bytes(&template_data()).unwrap()).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/risk",
        json!({ "city": "Bogotá", "carrier": "Servientrega", "orderValue": 800000, "productType": "fragil" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // 15 base + 10 product + 15 value
    assert_eq!(body["score"], 40.0);
    assert_eq!(body["risk"], "MEDIO");

    let (_, body) = send_json(
        &app,
        "POST",
        "/api/v1/risk",
        json!({ "city": "Leticia", "carrier": "TCC" }),
    )
    .await;
    assert_eq!(body["risk"], "DESCONOCIDO");
    assert_eq!(body["score"], 50.0);

    let (status, _) = send_json(&app, "POST", "/api/v1/risk", json!({ "city": "", "carrier": "TCC" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get_json(&app, "/api/v1/recommend/bogota").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["best"]["carrier"], "SERVIENTREGA");
    assert_eq!(body["alternatives"][0]["carrier"], "COORDINADORA");
}

#[tokio::test]
async fn report_with_fallback_insights() {
    let app = app().await;
    let shipments = json!([
        { "id": "1", "carrier": "TCC", "status": "ENTREGADO", "destination": "Cra 5, CALI" },
        { "id": "2", "carrier": "TCC", "status": "DEVUELTO", "destination": "Cra 9, CALI" },
        { "id": "3", "carrier": "ENVIA", "status": "EN_TRANSITO", "destination": "Cl 3, PASTO" }
    ]);

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/report?insights=true",
        json!({ "shipments": shipments }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["totalShipments"], 3);
    assert_eq!(body["report"]["criticalZones"][0]["city"], "CALI");
    assert!(body["insights"]["provider"].is_null());
    assert!(body["insights"]["text"].as_str().unwrap().contains("3 envíos"));

    let (_, body) = send_json(&app, "POST", "/api/v1/report", json!({ "shipments": [] })).await;
    assert!(body.get("insights").is_none());
}

#[tokio::test]
async fn integrations_are_masked_and_routed() {
    let app = app().await;

    let (status, body) = send_json(
        &app,
        "PUT",
        "/api/v1/integrations/providers/claude",
        json!({ "apiKey": "sk-ant-api03-super-secret", "enabled": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apiKey"], "sk-a...cret");
    assert_eq!(body["status"], "disconnected");

    let (status, _) = send_json(
        &app,
        "PUT",
        "/api/v1/integrations/assignments/chat_principal",
        json!({ "provider": "claude" }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = get_json(&app, "/api/v1/integrations").await;
    assert_eq!(body["assignments"]["chat_principal"], "claude");
    assert!(!body.to_string().contains("super-secret"));

    let (status, _) = send_json(&app, "PUT", "/api/v1/integrations/providers/openai", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &app,
        "PUT",
        "/api/v1/integrations/assignments/bailar",
        json!({ "provider": null }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_without_provider() {
    let app = app().await;

    let (status, body) = send_json(&app, "POST", "/api/v1/chat", json!({ "message": "hola" })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["provider"].is_null());
    assert!(body["text"].as_str().unwrap().contains("demostración"));

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/v1/chat",
        json!({ "message": "hola", "demoFallback": false }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send_json(&app, "POST", "/api/v1/chat", json!({ "message": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn command_uses_keyword_classifier() {
    let app = app().await;
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/command",
        json!({ "command": "¿cuál es el riesgo de enviar a Pasto con Envia?" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "risk_analysis");
    assert_eq!(body["entities"]["city"], "PASTO");
    assert_eq!(body["entities"]["carrier"], "ENVIA");
}

#[tokio::test]
async fn provider_test_without_key_records_error() {
    let app = app().await;
    let (status, body) = send_json(&app, "POST", "/api/v1/integrations/providers/chatea/test", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert!(body["lastError"].as_str().unwrap().contains("chatea"));
}
