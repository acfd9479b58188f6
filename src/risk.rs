//! Risk scoring for a (city, carrier) shipment
//!
//! The score starts at the carrier's non-delivery percentage in the city and
//! accumulates penalties for slow transit, thin history, sensitive products
//! and high order value. Penalties within a group stack: a 12-day average
//! pays the 5-, 8- and 10-day penalties together.

use serde::{Deserialize, Serialize};

use crate::models::{HistoricalData, ProductType};

/// Orders above this value (COP) carry a penalty
pub const HIGH_VALUE_THRESHOLD: f64 = 500_000.0;

/// (days exceeded, penalty), cumulative
const TIME_PENALTIES: [(f64, f64); 3] = [(5.0, 10.0), (8.0, 15.0), (10.0, 20.0)];

/// (minimum samples, penalty when below), cumulative
const VOLUME_PENALTIES: [(u32, f64); 2] = [(10, 20.0), (5, 30.0)];

const SENSITIVE_PRODUCT_PENALTY: f64 = 10.0;
const HIGH_VALUE_PENALTY: f64 = 15.0;
const UNKNOWN_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "BAJO")]
    Low,
    #[serde(rename = "MEDIO")]
    Medium,
    #[serde(rename = "ALTO")]
    High,
    #[serde(rename = "CRÍTICO")]
    Critical,
    #[serde(rename = "DESCONOCIDO")]
    Unknown,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            RiskLevel::Critical
        } else if score > 50.0 {
            RiskLevel::High
        } else if score > 30.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "BAJO",
            RiskLevel::Medium => "MEDIO",
            RiskLevel::High => "ALTO",
            RiskLevel::Critical => "CRÍTICO",
            RiskLevel::Unknown => "DESCONOCIDO",
        }
    }
}

/// Every component that went into the score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    pub delivery_rate: Option<f64>,
    pub return_rate: Option<f64>,
    pub avg_days: Option<f64>,
    pub sample_size: u32,
    pub base_score: f64,
    pub time_penalty: f64,
    pub volume_penalty: f64,
    pub product_penalty: f64,
    pub value_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnalysis {
    pub risk: RiskLevel,
    /// 0-100, higher is riskier
    pub score: f64,
    pub factors: RiskFactors,
    pub recommendations: Vec<String>,
}

/// Score the risk of shipping with `carrier` to `city`.
///
/// Returns a fixed `DESCONOCIDO` analysis with score 50 when the historical
/// data has no row for the pair.
pub fn calculate_risk_score(
    city: &str,
    carrier: &str,
    historical: &HistoricalData,
    order_value: Option<f64>,
    product_type: ProductType,
) -> RiskAnalysis {
    let Some(perf) = historical.find(city, carrier) else {
        return unknown_risk(city, carrier);
    };

    let base_score = 100.0 - perf.delivery_rate;

    let time_penalty: f64 = perf
        .avg_time_value
        .map(|days| {
            TIME_PENALTIES
                .iter()
                .filter(|(limit, _)| days > *limit)
                .map(|(_, penalty)| penalty)
                .sum::<f64>()
        })
        .unwrap_or(0.0);

    let volume_penalty: f64 = VOLUME_PENALTIES
        .iter()
        .filter(|(min, _)| perf.total < *min)
        .map(|(_, penalty)| penalty)
        .sum();

    let product_penalty = if product_type.is_sensitive() {
        SENSITIVE_PRODUCT_PENALTY
    } else {
        0.0
    };

    let value_penalty = match order_value {
        Some(value) if value > HIGH_VALUE_THRESHOLD => HIGH_VALUE_PENALTY,
        _ => 0.0,
    };

    let score = (base_score + time_penalty + volume_penalty + product_penalty + value_penalty)
        .clamp(0.0, 100.0);
    let risk = RiskLevel::from_score(score);

    let factors = RiskFactors {
        delivery_rate: Some(perf.delivery_rate),
        return_rate: Some(perf.return_rate),
        avg_days: perf.avg_time_value,
        sample_size: perf.total,
        base_score,
        time_penalty,
        volume_penalty,
        product_penalty,
        value_penalty,
    };

    let recommendations = build_recommendations(risk, &factors, city, &perf.carrier);

    RiskAnalysis {
        risk,
        score,
        factors,
        recommendations,
    }
}

fn unknown_risk(city: &str, carrier: &str) -> RiskAnalysis {
    RiskAnalysis {
        risk: RiskLevel::Unknown,
        score: UNKNOWN_SCORE,
        factors: RiskFactors {
            base_score: UNKNOWN_SCORE,
            ..RiskFactors::default()
        },
        recommendations: vec![
            format!("Sin datos históricos de {} en {}", carrier, city),
            "Proceder con precaución y monitorear de cerca el envío".to_string(),
            "Cargar datos actualizados para mejorar la estimación".to_string(),
        ],
    }
}

fn build_recommendations(
    risk: RiskLevel,
    factors: &RiskFactors,
    city: &str,
    carrier: &str,
) -> Vec<String> {
    let mut recs: Vec<String> = match risk {
        RiskLevel::Critical => vec![
            format!(
                "Evitar {} para {}: buscar una transportadora con mejor historial",
                carrier, city
            ),
            "Confirmar datos del cliente y considerar pago anticipado".to_string(),
        ],
        RiskLevel::High => vec![
            "Confirmar dirección y teléfono del destinatario antes del despacho".to_string(),
            "Hacer seguimiento diario de la guía".to_string(),
        ],
        RiskLevel::Medium => {
            vec!["Monitorear la guía e informar al cliente la fecha estimada".to_string()]
        }
        RiskLevel::Low | RiskLevel::Unknown => {
            vec!["Riesgo bajo: despachar con el proceso estándar".to_string()]
        }
    };

    if factors.time_penalty > 0.0 {
        if let Some(days) = factors.avg_days {
            recs.push(format!(
                "Tiempo promedio de {:.1} días: advertir al cliente sobre tiempos extendidos",
                days
            ));
        }
    }
    if factors.volume_penalty > 0.0 {
        recs.push(format!(
            "Pocos datos históricos ({} envíos): la estimación es poco confiable",
            factors.sample_size
        ));
    }
    if factors.product_penalty > 0.0 {
        recs.push("Producto sensible: reforzar el embalaje".to_string());
    }
    if factors.value_penalty > 0.0 {
        recs.push("Pedido de alto valor: considerar seguro adicional".to_string());
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CarrierPerformance;

    fn data_with(deliveries: u32, total: u32, avg_days: Option<f64>) -> HistoricalData {
        let mut data = HistoricalData::new();
        data.upsert(
            "BOGOTA",
            CarrierPerformance::from_counts("Servientrega", deliveries, total - deliveries, total, avg_days),
        );
        data
    }

    #[test]
    fn test_unknown_pair() {
        let data = data_with(90, 100, Some(2.0));
        let analysis = calculate_risk_score("CALI", "SERVIENTREGA", &data, None, ProductType::General);
        assert_eq!(analysis.risk, RiskLevel::Unknown);
        assert_eq!(analysis.score, 50.0);

        let analysis = calculate_risk_score("BOGOTA", "TCC", &data, None, ProductType::General);
        assert_eq!(analysis.risk, RiskLevel::Unknown);
        assert_eq!(analysis.score, 50.0);
    }

    #[test]
    fn test_base_score_is_non_delivery_rate() {
        let data = data_with(90, 100, Some(2.0));
        let analysis = calculate_risk_score("Bogotá", "servientrega", &data, None, ProductType::General);
        assert!((analysis.score - 10.0).abs() < 1e-9);
        assert_eq!(analysis.risk, RiskLevel::Low);
    }

    #[test]
    fn test_time_penalties_stack() {
        let data = data_with(90, 100, Some(12.0));
        let analysis = calculate_risk_score("BOGOTA", "SERVIENTREGA", &data, None, ProductType::General);
        assert_eq!(analysis.factors.time_penalty, 45.0);
        assert!((analysis.score - 55.0).abs() < 1e-9);
        assert_eq!(analysis.risk, RiskLevel::High);
    }

    #[test]
    fn test_volume_penalties_stack() {
        let data = data_with(4, 4, None);
        let analysis = calculate_risk_score("BOGOTA", "SERVIENTREGA", &data, None, ProductType::General);
        assert_eq!(analysis.factors.volume_penalty, 50.0);
        assert_eq!(analysis.risk, RiskLevel::Medium);

        let data = data_with(8, 8, None);
        let analysis = calculate_risk_score("BOGOTA", "SERVIENTREGA", &data, None, ProductType::General);
        assert_eq!(analysis.factors.volume_penalty, 20.0);
    }

    #[test]
    fn test_product_and_value_penalties() {
        let data = data_with(90, 100, None);
        let analysis = calculate_risk_score(
            "BOGOTA",
            "SERVIENTREGA",
            &data,
            Some(750_000.0),
            ProductType::Electronic,
        );
        assert_eq!(analysis.factors.product_penalty, 10.0);
        assert_eq!(analysis.factors.value_penalty, 15.0);
        assert!((analysis.score - 35.0).abs() < 1e-9);

        let analysis = calculate_risk_score(
            "BOGOTA",
            "SERVIENTREGA",
            &data,
            Some(500_000.0),
            ProductType::General,
        );
        assert_eq!(analysis.factors.value_penalty, 0.0);
    }

    #[test]
    fn test_score_is_clamped() {
        let data = data_with(0, 3, Some(15.0));
        let analysis = calculate_risk_score(
            "BOGOTA",
            "SERVIENTREGA",
            &data,
            Some(1_000_000.0),
            ProductType::Fragile,
        );
        assert_eq!(analysis.score, 100.0);
        assert_eq!(analysis.risk, RiskLevel::Critical);
    }

    #[test]
    fn test_score_monotonic_in_transit_time() {
        let mut previous = f64::MIN;
        for tenth in 0..=150 {
            let days = tenth as f64 / 10.0;
            let data = data_with(70, 100, Some(days));
            let score = calculate_risk_score("BOGOTA", "SERVIENTREGA", &data, None, ProductType::General).score;
            assert!(score >= previous, "score dropped at {} days", days);
            previous = score;
        }
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(RiskLevel::from_score(70.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(70.1), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(50.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(30.0), RiskLevel::Low);
    }

    #[test]
    fn test_level_serializes_in_spanish() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, "\"CRÍTICO\"");
    }
}
