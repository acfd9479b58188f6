//! Demo data generator for Litper Pro
//!
//! Writes a historical workbook (Tasa_Entregas + Tiempo_Promedio) and a
//! shipment CSV over the known Colombian cities and carriers, with seeded
//! random variation so runs are reproducible.
//!
//! Usage:
//!   cargo run --release --bin generate_synthetic -- [OPTIONS]
//!
//! Options:
//!   --shipments <N>      Shipment rows in the CSV (default: 2000)
//!   --seed <N>           Random seed for reproducibility (optional)
//!   --workbook <PATH>    Output workbook (default: data/historico_demo.xlsx)
//!   --csv <PATH>         Output CSV (default: data/envios_demo.csv)

use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::Parser;
use csv::WriterBuilder;
use litper_pro::carrier_names::known_carriers;
use litper_pro::cities::KNOWN_CITIES;
use litper_pro::import::write_workbook;
use litper_pro::models::{CarrierPerformance, HistoricalData, ShipmentStatus};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Demo data generator
#[derive(Parser, Debug)]
#[command(name = "generate_synthetic")]
#[command(about = "Generate a demo historical workbook and shipment CSV")]
struct Args {
    /// Shipment rows to generate
    #[arg(long, default_value = "2000")]
    shipments: usize,

    /// Minimum carriers per city
    #[arg(long, default_value = "3")]
    min_carriers: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Output workbook path
    #[arg(long, default_value = "data/historico_demo.xlsx")]
    workbook: PathBuf,

    /// Output CSV path
    #[arg(long, default_value = "data/envios_demo.csv")]
    csv: PathBuf,
}

/// One row of the shipment CSV, in the import column layout
#[derive(Debug, Serialize)]
struct OutputRecord {
    id: String,
    carrier: String,
    status: String,
    destination: String,
    origin: String,
    estimated_delivery: String,
    last_update: String,
    order_value: Option<f64>,
    product_type: String,
}

const ORIGINS: [&str; 3] = ["BOGOTA", "MEDELLIN", "CALI"];
const PRODUCTS: [(&str, f64); 3] = [("general", 0.7), ("fragil", 0.15), ("electronico", 0.15)];

/// Per-carrier reliability (delivery probability) and base transit days
fn carrier_profiles(rng: &mut impl Rng) -> HashMap<&'static str, (f64, f64)> {
    known_carriers()
        .into_iter()
        .map(|c| (c, (rng.gen_range(0.72..0.95), rng.gen_range(1.5..4.0))))
        .collect()
}

/// Remote cities are harder: lower delivery rate and slower transit
fn city_difficulty(city: &str, rng: &mut impl Rng) -> f64 {
    if ORIGINS.contains(&city) {
        0.0
    } else {
        rng.gen_range(0.0..0.2)
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn build_historical(
    args: &Args,
    profiles: &HashMap<&'static str, (f64, f64)>,
    difficulty: &HashMap<&'static str, f64>,
    rng: &mut impl Rng,
) -> HistoricalData {
    let carriers = known_carriers();
    let mut data = HistoricalData::new();

    for city in KNOWN_CITIES {
        let max = carriers.len().min(6);
        let count = rng.gen_range(args.min_carriers.clamp(1, max)..=max);
        let hardness = difficulty.get(city).copied().unwrap_or(0.0);

        for carrier in carriers.choose_multiple(rng, count) {
            let (reliability, base_days) = profiles.get(carrier).copied().unwrap_or((0.8, 3.0));
            // a few thin rows so the minimum-sample rule has something to filter
            let total: u32 = if rng.gen_bool(0.1) {
                rng.gen_range(1..5)
            } else {
                rng.gen_range(10..600)
            };
            let rate = (reliability - hardness + rng.gen_range(-0.05..0.05)).clamp(0.3, 0.99);
            let deliveries = (total as f64 * rate).round() as u32;
            let returns = ((total - deliveries) as f64 * rng.gen_range(0.4..0.9)).round() as u32;
            let days = base_days * (1.0 + hardness * 10.0) + rng.gen_range(0.0..1.5);
            let days = (days * 10.0).round() / 10.0;

            data.upsert(
                city,
                CarrierPerformance::from_counts(carrier, deliveries, returns, total, Some(days)),
            );
        }
    }
    data
}

fn generate_shipment(
    index: usize,
    profiles: &HashMap<&'static str, (f64, f64)>,
    difficulty: &HashMap<&'static str, f64>,
    start: NaiveDateTime,
    rng: &mut impl Rng,
) -> OutputRecord {
    let carriers = known_carriers();
    let carrier = carriers.choose(rng).copied().unwrap_or("SERVIENTREGA");
    let destination = KNOWN_CITIES.choose(rng).copied().unwrap_or("BOGOTA");
    let origin = ORIGINS.choose(rng).copied().unwrap_or("BOGOTA");
    let (reliability, base_days) = profiles.get(carrier).copied().unwrap_or((0.8, 3.0));
    let hardness = difficulty.get(destination).copied().unwrap_or(0.0);

    let created = start + Duration::hours(rng.gen_range(0..24 * 28));
    let estimated = created + Duration::hours((base_days * 24.0) as i64);

    let roll: f64 = rng.gen();
    let success = reliability - hardness;
    let status = if roll < success * 0.8 {
        ShipmentStatus::Delivered
    } else if roll < success {
        if rng.gen_bool(0.5) {
            ShipmentStatus::InTransit
        } else {
            ShipmentStatus::Pending
        }
    } else if rng.gen_bool(0.5) {
        ShipmentStatus::Issue
    } else if rng.gen_bool(0.8) {
        ShipmentStatus::Returned
    } else {
        ShipmentStatus::Cancelled
    };

    // slow destinations drift further from the estimate
    let drift_hours = rng.gen_range(-12..48) + (hardness * 24.0 * 20.0 * rng.gen::<f64>()) as i64;
    let last_update = estimated + Duration::hours(drift_hours);

    let product = PRODUCTS
        .choose_weighted(rng, |(_, w)| *w)
        .map(|(p, _)| *p)
        .unwrap_or("general");

    OutputRecord {
        id: format!("{:012}", 240_000_000_000u64 + index as u64),
        carrier: carrier.to_string(),
        status: status.as_str().to_string(),
        destination: format!("Calle {} # {}-{}, {}", rng.gen_range(1..150), rng.gen_range(1..99), rng.gen_range(1..99), destination),
        origin: origin.to_string(),
        estimated_delivery: format_datetime(&estimated),
        last_update: format_datetime(&last_update),
        order_value: Some((rng.gen_range(20_000.0..1_500_000.0_f64) / 1000.0).round() * 1000.0),
        product_type: product.to_string(),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let args = Args::parse();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let profiles = carrier_profiles(&mut rng);
    let difficulty: HashMap<&'static str, f64> = KNOWN_CITIES
        .iter()
        .map(|c| (*c, city_difficulty(c, &mut rng)))
        .collect();

    for path in [&args.workbook, &args.csv] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }

    let historical = build_historical(&args, &profiles, &difficulty, &mut rng);
    write_workbook(&historical, &args.workbook)?;
    println!(
        "Workbook: {} rows across {} cities -> {}",
        historical.row_count(),
        historical.city_count(),
        args.workbook.display()
    );

    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .ok_or_else(|| anyhow::anyhow!("invalid start date"))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_path(&args.csv)?;
    for i in 0..args.shipments {
        writer.serialize(generate_shipment(i, &profiles, &difficulty, start, &mut rng))?;
    }
    writer.flush()?;
    println!("Shipments: {} rows -> {}", args.shipments, args.csv.display());

    Ok(())
}
