//! REST API server for the Litper Pro dashboard
//!
//! Usage:
//!   ./target/release/api_server [--port PORT] [--db-path PATH]
//!
//! REST endpoints:
//!   GET    /api/v1/health                                 - Health check
//!   GET    /api/v1/historical                             - Stored historical data
//!   POST   /api/v1/historical/upload                      - Import an xlsx body
//!   GET    /api/v1/historical/template                    - Example workbook
//!   GET    /api/v1/historical/export                      - Stored data as xlsx
//!   DELETE /api/v1/historical                             - Clear historical data
//!   POST   /api/v1/risk                                   - Risk score
//!   GET    /api/v1/recommend/:city                        - Best carrier for a city
//!   POST   /api/v1/report?insights=true                   - Shipment report
//!   GET    /api/v1/integrations                           - Integration config (masked)
//!   PUT    /api/v1/integrations/providers/:provider       - Update a provider
//!   POST   /api/v1/integrations/providers/:provider/test  - Test a provider
//!   PUT    /api/v1/integrations/assignments/:function     - Route a function
//!   POST   /api/v1/chat                                   - Chat assistant
//!   POST   /api/v1/command                                - Command classification
//!   POST   /api/v1/whatsapp                               - Send a WhatsApp message

use anyhow::Result;
use clap::Parser;
use litper_pro::api::{create_rest_router, DashboardService};
use litper_pro::config::AppConfig;
use litper_pro::db::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "api_server")]
#[command(about = "Litper Pro REST API")]
struct Args {
    /// Port to listen on (default: LITPER_PORT or 8080)
    #[arg(long)]
    port: Option<u16>,

    /// Path to the SurrealDB database (default: LITPER_DB_PATH or data/litper.db)
    #[arg(long)]
    db_path: Option<String>,
}

fn print_banner(config: &AppConfig) {
    println!("============================================================");
    println!("              LITPER PRO API SERVER");
    println!("============================================================");
    println!();
    println!("  Port:       {}", config.port);
    println!("  REST:       http://localhost:{}/api/v1/", config.port);
    println!("  Database:   {}", config.db_path);
    println!("  ML backend: {}", config.ml_backend_url);
    println!();
    println!("============================================================");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = args.db_path {
        config.db_path = path;
    }

    print_banner(&config);

    let store = Store::open(&config.db_path).await?;
    let service = Arc::new(DashboardService::new(store, &config).await?);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let app = create_rest_router(service);
    tracing::info!("Starting REST server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
