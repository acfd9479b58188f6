//! Weekly shipment report: success/failure metrics, carrier ranking,
//! critical zones and delayed routes.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cities::extract_city;
use crate::models::Shipment;

pub const DEFAULT_TOP_ZONES: usize = 5;

/// A route is delayed when its slowest shipment exceeds this multiple of its average
const DELAY_FACTOR: f64 = 1.5;
const MIN_ROUTE_SAMPLES: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierStat {
    pub carrier: String,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub success_rate: f64,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalZone {
    pub city: String,
    pub failures: usize,
    pub total: usize,
    pub failure_rate: f64,
    /// Carrier with the most failed shipments in the city
    pub main_carrier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayedRoute {
    pub origin: String,
    pub destination: String,
    pub route: String,
    pub samples: usize,
    pub avg_days: f64,
    pub max_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub period_start: Option<NaiveDateTime>,
    pub period_end: Option<NaiveDateTime>,
    pub total_shipments: usize,
    pub successful: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub success_rate: f64,
    pub failure_rate: f64,
    /// Mean of `Shipment::delivery_days` over delivered shipments
    pub avg_delivery_days: f64,
    pub best_carrier: Option<CarrierStat>,
    pub worst_carrier: Option<CarrierStat>,
    pub carriers: Vec<CarrierStat>,
    pub critical_zones: Vec<CriticalZone>,
    pub delayed_routes: Vec<DelayedRoute>,
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 * 1000.0 / total as f64).round() / 10.0
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Groups by key, keeping the order in which keys first appear
struct OrderedCounter<V> {
    index: HashMap<String, usize>,
    entries: Vec<(String, V)>,
}

impl<V: Default> OrderedCounter<V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn entry(&mut self, key: &str) -> &mut V {
        let i = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.entries.push((key.to_string(), V::default()));
                self.index.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[i].1
    }
}

/// Most frequent key; ties go to the key seen first
fn most_common(counter: &OrderedCounter<usize>) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for (key, count) in &counter.entries {
        if best.map_or(true, |(_, c)| *count > c) {
            best = Some((key, *count));
        }
    }
    best.map(|(k, _)| k.clone())
}

/// Build the report for a list of shipments. An empty list yields a zeroed report.
pub fn generate_analytics_report(shipments: &[Shipment], top_zones: usize) -> AnalyticsReport {
    let total = shipments.len();
    let successful = shipments.iter().filter(|s| s.status.is_success()).count();
    let failed = shipments.iter().filter(|s| s.status.is_failure()).count();

    let delivered_days: Vec<f64> = shipments
        .iter()
        .filter(|s| s.status.is_success())
        .filter_map(Shipment::delivery_days)
        .collect();
    let avg_delivery_days = if delivered_days.is_empty() {
        0.0
    } else {
        round2(delivered_days.iter().sum::<f64>() / delivered_days.len() as f64)
    };

    let carriers = carrier_stats(shipments);

    let mut best_carrier: Option<&CarrierStat> = None;
    for stat in &carriers {
        if best_carrier.map_or(true, |b| stat.success_rate > b.success_rate) {
            best_carrier = Some(stat);
        }
    }
    let mut worst_carrier: Option<&CarrierStat> = None;
    for stat in carriers.iter().filter(|c| c.failures > 0) {
        if worst_carrier.map_or(true, |w| stat.failures > w.failures) {
            worst_carrier = Some(stat);
        }
    }
    let best_carrier = best_carrier.cloned();
    let worst_carrier = worst_carrier.cloned();

    let period_start = shipments.iter().filter_map(|s| s.last_update).min();
    let period_end = shipments.iter().filter_map(|s| s.last_update).max();

    AnalyticsReport {
        generated_at: Utc::now(),
        period_start,
        period_end,
        total_shipments: total,
        successful,
        failed,
        in_progress: total - successful - failed,
        success_rate: pct(successful, total),
        failure_rate: pct(failed, total),
        avg_delivery_days,
        best_carrier,
        worst_carrier,
        critical_zones: critical_zones(shipments, top_zones),
        delayed_routes: delayed_routes(shipments),
        carriers,
    }
}

fn carrier_stats(shipments: &[Shipment]) -> Vec<CarrierStat> {
    let mut counter: OrderedCounter<(usize, usize, usize)> = OrderedCounter::new();
    for s in shipments {
        let entry = counter.entry(&s.carrier);
        entry.0 += 1;
        if s.status.is_success() {
            entry.1 += 1;
        }
        if s.status.is_failure() {
            entry.2 += 1;
        }
    }

    counter
        .entries
        .into_iter()
        .map(|(carrier, (total, successes, failures))| CarrierStat {
            carrier,
            total,
            successes,
            failures,
            success_rate: pct(successes, total),
            failure_rate: pct(failures, total),
        })
        .collect()
}

fn critical_zones(shipments: &[Shipment], limit: usize) -> Vec<CriticalZone> {
    #[derive(Default)]
    struct ZoneAcc {
        total: usize,
        failures: usize,
        carriers: Option<OrderedCounter<usize>>,
    }

    let mut zones: OrderedCounter<ZoneAcc> = OrderedCounter::new();
    for s in shipments {
        let zone = zones.entry(&extract_city(&s.destination));
        zone.total += 1;
        if s.status.is_failure() {
            zone.failures += 1;
            *zone
                .carriers
                .get_or_insert_with(OrderedCounter::new)
                .entry(&s.carrier) += 1;
        }
    }

    let mut result: Vec<CriticalZone> = zones
        .entries
        .into_iter()
        .filter(|(_, z)| z.failures > 0)
        .map(|(city, z)| CriticalZone {
            main_carrier: z.carriers.as_ref().and_then(most_common),
            failure_rate: pct(z.failures, z.total),
            failures: z.failures,
            total: z.total,
            city,
        })
        .collect();

    result.sort_by(|a, b| b.failures.cmp(&a.failures));
    result.truncate(limit);
    result
}

fn delayed_routes(shipments: &[Shipment]) -> Vec<DelayedRoute> {
    let mut routes: OrderedCounter<Vec<f64>> = OrderedCounter::new();
    let mut endpoints: HashMap<String, (String, String)> = HashMap::new();

    for s in shipments {
        let Some(days) = s.delivery_days() else {
            continue;
        };
        let origin = extract_city(&s.origin);
        let destination = extract_city(&s.destination);
        let key = format!("{}→{}", origin, destination);
        routes.entry(&key).push(days);
        endpoints.entry(key).or_insert((origin, destination));
    }

    let mut delayed: Vec<DelayedRoute> = routes
        .entries
        .into_iter()
        .filter(|(_, days)| days.len() >= MIN_ROUTE_SAMPLES)
        .filter_map(|(route, days)| {
            let avg = days.iter().sum::<f64>() / days.len() as f64;
            let max = days.iter().copied().fold(f64::MIN, f64::max);
            if max <= avg * DELAY_FACTOR {
                return None;
            }
            let (origin, destination) = endpoints.remove(&route)?;
            Some(DelayedRoute {
                origin,
                destination,
                route,
                samples: days.len(),
                avg_days: round2(avg),
                max_days: round2(max),
            })
        })
        .collect();

    delayed.sort_by(|a, b| {
        let ra = a.max_days / a.avg_days.max(f64::EPSILON);
        let rb = b.max_days / b.avg_days.max(f64::EPSILON);
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });
    delayed
}

/// Plain-text summary used when no AI provider can narrate the report
pub fn fallback_summary(report: &AnalyticsReport) -> String {
    if report.total_shipments == 0 {
        return "No hay envíos en el periodo seleccionado.".to_string();
    }

    let mut lines = vec![format!(
        "Se analizaron {} envíos: {} entregados ({:.1}%), {} con falla ({:.1}%) y {} en curso.",
        report.total_shipments,
        report.successful,
        report.success_rate,
        report.failed,
        report.failure_rate,
        report.in_progress
    )];

    if report.avg_delivery_days > 0.0 {
        lines.push(format!(
            "Tiempo promedio de entrega: {:.1} días.",
            report.avg_delivery_days
        ));
    }
    if let Some(best) = &report.best_carrier {
        lines.push(format!(
            "Mejor transportadora: {} con {:.1}% de éxito.",
            best.carrier, best.success_rate
        ));
    }
    if let Some(worst) = &report.worst_carrier {
        lines.push(format!(
            "Transportadora con más fallas: {} ({} envíos).",
            worst.carrier, worst.failures
        ));
    }
    if let Some(zone) = report.critical_zones.first() {
        lines.push(format!(
            "Zona más crítica: {} con {} fallas{}.",
            zone.city,
            zone.failures,
            zone.main_carrier
                .as_ref()
                .map(|c| format!(", principalmente con {}", c))
                .unwrap_or_default()
        ));
    }
    if !report.delayed_routes.is_empty() {
        let routes: Vec<&str> = report
            .delayed_routes
            .iter()
            .take(3)
            .map(|r| r.route.as_str())
            .collect();
        lines.push(format!("Rutas con retrasos atípicos: {}.", routes.join(", ")));
    }

    lines.join("\n")
}
