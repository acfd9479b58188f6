//! Best-carrier recommendation for a destination city

use serde::{Deserialize, Serialize};

use crate::cities::normalize_text;
use crate::models::{CarrierPerformance, HistoricalData, ProductType};

/// Carriers with fewer historical shipments than this are never recommended
pub const MIN_SAMPLES: u32 = 5;

const MAX_ALTERNATIVES: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCarrier {
    pub carrier: String,
    pub score: f64,
    pub delivery_rate: f64,
    pub avg_time_value: Option<f64>,
    pub sample_size: u32,
    pub speed_bonus: f64,
    pub volume_bonus: f64,
    pub product_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierRecommendation {
    pub city: String,
    pub best: Option<RankedCarrier>,
    pub alternatives: Vec<RankedCarrier>,
    pub reason: String,
}

fn speed_bonus(avg_days: Option<f64>) -> f64 {
    match avg_days {
        Some(d) if d <= 3.0 => 15.0,
        Some(d) if d <= 5.0 => 10.0,
        Some(d) if d <= 7.0 => 5.0,
        _ => 0.0,
    }
}

fn volume_bonus(samples: u32) -> f64 {
    if samples >= 50 {
        10.0
    } else if samples >= 20 {
        5.0
    } else {
        0.0
    }
}

fn rank(perf: &CarrierPerformance, product_type: ProductType) -> RankedCarrier {
    let speed_bonus = speed_bonus(perf.avg_time_value);
    let volume_bonus = volume_bonus(perf.total);
    let slow = perf.avg_time_value.is_some_and(|d| d > 7.0);
    let product_penalty = if product_type.is_sensitive() && slow {
        10.0
    } else {
        0.0
    };

    RankedCarrier {
        carrier: perf.carrier.clone(),
        score: perf.delivery_rate + speed_bonus + volume_bonus - product_penalty,
        delivery_rate: perf.delivery_rate,
        avg_time_value: perf.avg_time_value,
        sample_size: perf.total,
        speed_bonus,
        volume_bonus,
        product_penalty,
    }
}

/// Pick the highest scoring carrier for `city` among carriers with at least
/// `MIN_SAMPLES` shipments, plus up to two runners-up.
///
/// Equal scores keep the order the rows were imported in.
pub fn recommend_best_carrier(
    city: &str,
    historical: &HistoricalData,
    product_type: ProductType,
) -> CarrierRecommendation {
    let city_key = normalize_text(city);

    let Some(rows) = historical.city(&city_key) else {
        return CarrierRecommendation {
            city: city_key.clone(),
            best: None,
            alternatives: Vec::new(),
            reason: format!("No hay datos históricos para {}", city_key),
        };
    };

    let mut ranked: Vec<RankedCarrier> = rows
        .iter()
        .filter(|r| r.total >= MIN_SAMPLES)
        .map(|r| rank(r, product_type))
        .collect();

    if ranked.is_empty() {
        return CarrierRecommendation {
            reason: format!(
                "Ninguna transportadora tiene al menos {} envíos registrados en {} ({} evaluadas)",
                MIN_SAMPLES,
                city_key,
                rows.len()
            ),
            city: city_key,
            best: None,
            alternatives: Vec::new(),
        };
    }

    // stable sort: ties keep insertion order
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranked = ranked.into_iter();
    let best = ranked.next();
    let alternatives: Vec<RankedCarrier> = ranked.take(MAX_ALTERNATIVES).collect();

    let reason = best
        .as_ref()
        .map(|b| {
            let days = b
                .avg_time_value
                .map(|d| format!("{:.1} días promedio", d))
                .unwrap_or_else(|| "sin tiempo promedio".to_string());
            format!(
                "{}: {:.1}% de entregas, {}, {} envíos registrados",
                b.carrier, b.delivery_rate, days, b.sample_size
            )
        })
        .unwrap_or_default();

    CarrierRecommendation {
        city: city_key,
        best,
        alternatives,
        reason,
    }
}
