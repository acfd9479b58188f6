//! `litper`: command line front end for the Litper Pro dashboard
//!
//! Usage:
//!   litper import data/historico.xlsx
//!   litper risk --city Cali --carrier TCC --value 650000 --product fragil
//!   litper recommend Medellín
//!   litper report data/envios.csv --insights
//!   litper integrations set-key claude sk-ant-...
//!   litper ml dashboard

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use litper_pro::analytics::{fallback_summary, DEFAULT_TOP_ZONES};
use litper_pro::api::DashboardService;
use litper_pro::config::AppConfig;
use litper_pro::db::Store;
use litper_pro::import::{import_workbook, template_data, write_workbook};
use litper_pro::integrations::{
    AiFunction, ChatMessage, DataSourceKind, ProviderKind, ProviderUpdate,
};
use litper_pro::ml_backend::{MlBackendClient, PredictionRequest};
use litper_pro::models::{load_shipments_csv, ProductType};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "litper")]
#[command(about = "Carrier performance, risk and reports for Colombian parcel delivery")]
struct Cli {
    /// Path to the SurrealDB database
    #[arg(long, env = "LITPER_DB_PATH")]
    db_path: Option<String>,

    /// ML backend base URL
    #[arg(long, env = "LITPER_ML_BACKEND_URL")]
    ml_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a historical workbook (Tasa_Entregas + Tiempo_Promedio sheets)
    Import { file: PathBuf },
    /// Write an example workbook with the expected layout
    Template {
        #[arg(default_value = "plantilla_litper.xlsx")]
        output: PathBuf,
    },
    /// Export the stored historical data as a workbook
    Export { output: PathBuf },
    /// Risk score for shipping with a carrier to a city
    Risk {
        #[arg(long)]
        city: String,
        #[arg(long)]
        carrier: String,
        /// Declared order value (COP)
        #[arg(long)]
        value: Option<f64>,
        #[arg(long, default_value = "general")]
        product: String,
    },
    /// Best carrier for a city
    Recommend {
        city: String,
        #[arg(long, default_value = "general")]
        product: String,
    },
    /// Shipment report from a CSV export
    Report {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TOP_ZONES)]
        top_zones: usize,
        /// Ask the assigned AI provider for a narrative
        #[arg(long)]
        insights: bool,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the main chat assistant
    Chat {
        message: String,
        /// Fail instead of answering with the demo text
        #[arg(long)]
        no_demo: bool,
    },
    /// Classify a free-text command
    Command { text: String },
    /// Send a WhatsApp message through Chatea
    Whatsapp { phone: String, message: String },
    /// AI provider and data-source configuration
    Integrations {
        #[command(subcommand)]
        action: IntegrationsAction,
    },
    /// ML backend queries
    Ml {
        #[command(subcommand)]
        action: MlAction,
    },
}

#[derive(Subcommand, Debug)]
enum IntegrationsAction {
    /// Show configuration (keys masked)
    Show,
    /// Store an API key
    SetKey {
        provider: String,
        key: String,
        /// Override the vendor base URL
        #[arg(long)]
        base_url: Option<String>,
        /// Override the model (Claude only)
        #[arg(long)]
        model: Option<String>,
    },
    Enable { provider: String },
    Disable { provider: String },
    /// Route a function to a provider; omit the provider to unassign
    Assign {
        function: String,
        provider: Option<String>,
    },
    /// Test a provider (claude, chatea) or data source (ml_backend, chatea_crm, excel)
    Test { target: String },
}

#[derive(Subcommand, Debug)]
enum MlAction {
    Dashboard,
    Alerts,
    Predict {
        #[arg(long)]
        carrier: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        value: Option<f64>,
        #[arg(long)]
        product: Option<String>,
    },
    /// Send a workbook to the backend for training
    Upload { file: PathBuf },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_provider(raw: &str) -> Result<ProviderKind> {
    Ok(raw.parse::<ProviderKind>()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(path) = cli.db_path {
        config.db_path = path;
    }
    if let Some(url) = cli.ml_url {
        config.ml_backend_url = url.trim_end_matches('/').to_string();
    }

    // ML queries and templates need no database
    match cli.command {
        Command::Ml { action } => return run_ml(&config, action).await,
        Command::Template { output } => {
            write_workbook(&template_data(), &output)?;
            println!("Plantilla escrita en {}", output.display());
            return Ok(());
        }
        command => {
            let store = Store::open(&config.db_path)
                .await
                .with_context(|| format!("opening database at {}", config.db_path))?;
            info!("Connected to SurrealDB at {}", config.db_path);
            let service = DashboardService::new(store, &config).await?;
            run(&service, command).await
        }
    }
}

async fn run(service: &DashboardService, command: Command) -> Result<()> {
    match command {
        Command::Import { file } => {
            let report = import_workbook(&file)?;
            service.replace_historical(report.data.clone()).await?;
            println!(
                "Importadas {} filas de {} ciudades ({} transportadoras)",
                report.data.row_count(),
                report.data.city_count(),
                report.data.carriers().len()
            );
            for issue in &report.issues {
                println!("  {} fila {}: {}", issue.sheet, issue.row, issue.message);
            }
        }
        Command::Export { output } => {
            let data = service.historical().await?;
            write_workbook(&data, &output)?;
            println!("{} filas exportadas a {}", data.row_count(), output.display());
        }
        Command::Risk {
            city,
            carrier,
            value,
            product,
        } => {
            let analysis = service
                .risk(&city, &carrier, value, ProductType::from(product.as_str()))
                .await?;
            println!(
                "Riesgo {} ({:.0}/100) para {} hacia {}",
                analysis.risk.as_str(),
                analysis.score,
                carrier,
                city
            );
            for recommendation in &analysis.recommendations {
                println!("  - {}", recommendation);
            }
        }
        Command::Recommend { city, product } => {
            let rec = service
                .recommend(&city, ProductType::from(product.as_str()))
                .await?;
            match &rec.best {
                Some(best) => {
                    println!("{}: {} (puntaje {:.1})", rec.city, best.carrier, best.score);
                    for alt in &rec.alternatives {
                        println!("  alternativa: {} (puntaje {:.1})", alt.carrier, alt.score);
                    }
                }
                None => println!("{}: sin recomendación", rec.city),
            }
            println!("{}", rec.reason);
        }
        Command::Report {
            file,
            top_zones,
            insights,
            json,
        } => {
            let file = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
            let shipments = load_shipments_csv(file)?;
            let report = service.report(&shipments, top_zones);
            if json {
                print_json(&report)?;
            } else if insights {
                let narrative = service.narrate(&report).await;
                println!("{}", narrative.text);
            } else {
                println!("{}", fallback_summary(&report));
            }
        }
        Command::Chat { message, no_demo } => {
            let reply = service.chat(&[ChatMessage::user(message)], !no_demo).await?;
            println!("{}", reply.text);
        }
        Command::Command { text } => print_json(&service.command(&text).await)?,
        Command::Whatsapp { phone, message } => {
            service.send_whatsapp(&phone, &message).await?;
            println!("Mensaje enviado a {}", phone);
        }
        Command::Integrations { action } => run_integrations(service, action).await?,
        Command::Template { .. } | Command::Ml { .. } => {}
    }
    Ok(())
}

async fn run_integrations(service: &DashboardService, action: IntegrationsAction) -> Result<()> {
    match action {
        IntegrationsAction::Show => print_json(&service.integrations().await)?,
        IntegrationsAction::SetKey {
            provider,
            key,
            base_url,
            model,
        } => {
            let update = ProviderUpdate {
                api_key: Some(key),
                enabled: Some(true),
                base_url,
                model,
            };
            let updated = service.update_provider(parse_provider(&provider)?, update).await?;
            println!("{}: key {} guardada", updated.kind.display_name(), updated.api_key);
        }
        IntegrationsAction::Enable { provider } => {
            set_enabled(service, &provider, true).await?;
        }
        IntegrationsAction::Disable { provider } => {
            set_enabled(service, &provider, false).await?;
        }
        IntegrationsAction::Assign { function, provider } => {
            let function: AiFunction = function.parse().map_err(anyhow::Error::msg)?;
            let provider = provider.as_deref().map(parse_provider).transpose()?;
            service.assign(function, provider).await?;
            match provider {
                Some(kind) => println!("{} -> {}", function, kind),
                None => println!("{} sin asignar", function),
            }
        }
        IntegrationsAction::Test { target } => {
            if let Ok(kind) = target.parse::<ProviderKind>() {
                let tested = service.test_provider(kind).await?;
                println!(
                    "{}: {:?}{}",
                    kind,
                    tested.status,
                    tested
                        .last_error
                        .map(|e| format!(" ({})", e))
                        .unwrap_or_default()
                );
            } else {
                let source: DataSourceKind = target.parse().map_err(anyhow::Error::msg)?;
                let status = service
                    .integration_manager()
                    .write()
                    .await
                    .test_data_source(source)
                    .await?;
                println!("{}: {:?}", target, status);
            }
        }
    }
    Ok(())
}

async fn set_enabled(service: &DashboardService, provider: &str, enabled: bool) -> Result<()> {
    let update = ProviderUpdate {
        enabled: Some(enabled),
        ..Default::default()
    };
    let updated = service.update_provider(parse_provider(provider)?, update).await?;
    println!(
        "{} {}",
        updated.kind,
        if updated.enabled { "habilitado" } else { "deshabilitado" }
    );
    Ok(())
}

async fn run_ml(config: &AppConfig, action: MlAction) -> Result<()> {
    let client = MlBackendClient::new(&config.ml_backend_url, config.http_client()?);
    match action {
        MlAction::Dashboard => print_json(&client.dashboard().await?)?,
        MlAction::Alerts => {
            let alerts = client.alerts().await?;
            if alerts.is_empty() {
                println!("Sin alertas");
            }
            for alert in alerts {
                println!(
                    "[{}] {} {}{}",
                    alert.severidad,
                    alert.tipo,
                    alert.mensaje,
                    alert.guia.map(|g| format!(" (guía {})", g)).unwrap_or_default()
                );
            }
        }
        MlAction::Predict {
            carrier,
            city,
            value,
            product,
        } => {
            let request = PredictionRequest {
                transportadora: carrier,
                ciudad_destino: city,
                valor_declarado: value,
                tipo_producto: product,
            };
            print_json(&client.predict(&request).await?)?;
        }
        MlAction::Upload { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "datos.xlsx".to_string());
            print_json(&client.upload_excel(bytes, &filename).await?)?;
        }
    }
    Ok(())
}
