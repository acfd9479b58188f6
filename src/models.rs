use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use tracing::{info, warn};

use crate::carrier_names::canonical_carrier;
use crate::cities::normalize_text;

/// Aggregated delivery history of one carrier in one city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierPerformance {
    pub carrier: String,
    /// Percentage of `total` that was delivered (0-100)
    pub delivery_rate: f64,
    /// Percentage of `total` that was returned (0-100)
    pub return_rate: f64,
    /// Average transit days; `None` when the timing sheet has no row for this pair
    pub avg_time_value: Option<f64>,
    pub total: u32,
    pub deliveries: u32,
    pub returns: u32,
}

impl CarrierPerformance {
    pub fn from_counts(
        carrier: &str,
        deliveries: u32,
        returns: u32,
        total: u32,
        avg_time_value: Option<f64>,
    ) -> Self {
        let (delivery_rate, return_rate) = if total > 0 {
            (
                deliveries as f64 * 100.0 / total as f64,
                returns as f64 * 100.0 / total as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            carrier: canonical_carrier(carrier),
            delivery_rate,
            return_rate,
            avg_time_value,
            total,
            deliveries,
            returns,
        }
    }

    /// deliveries + returns never exceed the number of shipments
    pub fn is_consistent(&self) -> bool {
        self.deliveries as u64 + self.returns as u64 <= self.total as u64
    }
}

/// City -> per-carrier performance rows.
///
/// City keys are normalised (upper case, no accents) and carrier names are
/// canonical, so there is at most one row per (city, carrier). Rows keep
/// insertion order, which the recommender relies on to break ties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoricalData {
    cities: BTreeMap<String, Vec<CarrierPerformance>>,
}

impl HistoricalData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, replacing any existing row for the same carrier in that city
    pub fn upsert(&mut self, city: &str, mut performance: CarrierPerformance) {
        performance.carrier = canonical_carrier(&performance.carrier);
        let rows = self.cities.entry(normalize_text(city)).or_default();
        match rows.iter_mut().find(|r| r.carrier == performance.carrier) {
            Some(existing) => *existing = performance,
            None => rows.push(performance),
        }
    }

    pub fn city(&self, city: &str) -> Option<&[CarrierPerformance]> {
        self.cities.get(&normalize_text(city)).map(|rows| rows.as_slice())
    }

    pub fn find(&self, city: &str, carrier: &str) -> Option<&CarrierPerformance> {
        let carrier = canonical_carrier(carrier);
        self.city(city)?.iter().find(|r| r.carrier == carrier)
    }

    pub fn find_mut(&mut self, city: &str, carrier: &str) -> Option<&mut CarrierPerformance> {
        let carrier = canonical_carrier(carrier);
        self.cities
            .get_mut(&normalize_text(city))?
            .iter_mut()
            .find(|r| r.carrier == carrier)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<CarrierPerformance>)> {
        self.cities.iter()
    }

    pub fn carriers(&self) -> BTreeSet<String> {
        self.cities
            .values()
            .flat_map(|rows| rows.iter().map(|r| r.carrier.clone()))
            .collect()
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    pub fn row_count(&self) -> usize {
        self.cities.values().map(|rows| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

/// Shipment status as reported by carriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShipmentStatus {
    Delivered,
    InTransit,
    Pending,
    /// Novedad: the carrier reported a delivery exception
    Issue,
    Returned,
    Cancelled,
    Unknown,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Delivered => "ENTREGADO",
            ShipmentStatus::InTransit => "EN_TRANSITO",
            ShipmentStatus::Pending => "PENDIENTE",
            ShipmentStatus::Issue => "NOVEDAD",
            ShipmentStatus::Returned => "DEVUELTO",
            ShipmentStatus::Cancelled => "CANCELADO",
            ShipmentStatus::Unknown => "DESCONOCIDO",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Returned | ShipmentStatus::Issue | ShipmentStatus::Cancelled
        )
    }
}

impl From<&str> for ShipmentStatus {
    fn from(s: &str) -> Self {
        let normalized = normalize_text(&s.replace(['_', '-'], " "));
        match normalized.as_str() {
            "ENTREGADO" | "ENTREGADA" | "DELIVERED" => ShipmentStatus::Delivered,
            "EN TRANSITO" | "EN REPARTO" | "EN CAMINO" | "DESPACHADO" | "IN TRANSIT" => {
                ShipmentStatus::InTransit
            }
            "PENDIENTE" | "GENERADO" | "CREADO" | "PENDING" => ShipmentStatus::Pending,
            "NOVEDAD" | "CON NOVEDAD" | "ISSUE" | "EXCEPTION" => ShipmentStatus::Issue,
            "DEVUELTO" | "DEVOLUCION" | "EN DEVOLUCION" | "RETURNED" => ShipmentStatus::Returned,
            "CANCELADO" | "ANULADO" | "CANCELLED" => ShipmentStatus::Cancelled,
            _ => ShipmentStatus::Unknown,
        }
    }
}

impl From<String> for ShipmentStatus {
    fn from(s: String) -> Self {
        ShipmentStatus::from(s.as_str())
    }
}

impl From<ShipmentStatus> for String {
    fn from(status: ShipmentStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Product category, used by the risk and recommendation heuristics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductType {
    #[default]
    General,
    Fragile,
    Electronic,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::General => "general",
            ProductType::Fragile => "fragil",
            ProductType::Electronic => "electronico",
        }
    }

    /// Fragile and electronic goods get extra handling penalties
    pub fn is_sensitive(&self) -> bool {
        matches!(self, ProductType::Fragile | ProductType::Electronic)
    }
}

impl From<&str> for ProductType {
    fn from(s: &str) -> Self {
        let normalized = normalize_text(s);
        if normalized.starts_with("FRAGIL") {
            ProductType::Fragile
        } else if normalized.starts_with("ELECTRONIC")
            || normalized.starts_with("TECNOLOGIA")
        {
            ProductType::Electronic
        } else {
            ProductType::General
        }
    }
}

impl From<String> for ProductType {
    fn from(s: String) -> Self {
        ProductType::from(s.as_str())
    }
}

impl From<ProductType> for String {
    fn from(p: ProductType) -> Self {
        p.as_str().to_string()
    }
}

/// A tracked shipment (guía)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: String,
    pub carrier: String,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub estimated_delivery: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_update: Option<NaiveDateTime>,
    #[serde(default)]
    pub order_value: Option<f64>,
    #[serde(default)]
    pub product_type: ProductType,
}

/// Shipments further than this from their estimate are treated as bad data
pub const MAX_PLAUSIBLE_DAYS: f64 = 365.0;

impl Shipment {
    /// Days between the last update and the estimated delivery, if both are
    /// known and the gap is within 0-365 days.
    pub fn delivery_days(&self) -> Option<f64> {
        let (estimated, last) = (self.estimated_delivery?, self.last_update?);
        let days = (last - estimated).num_seconds().abs() as f64 / 86_400.0;
        (0.0..=MAX_PLAUSIBLE_DAYS).contains(&days).then_some(days)
    }
}

/// Raw record from shipment CSV files
#[derive(Debug, Deserialize)]
pub struct CsvShipmentRecord {
    pub id: String,
    pub carrier: String,
    pub status: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub estimated_delivery: String,
    #[serde(default)]
    pub last_update: String,
    #[serde(default)]
    pub order_value: Option<f64>,
    #[serde(default)]
    pub product_type: Option<String>,
}

impl CsvShipmentRecord {
    pub fn to_shipment(&self) -> anyhow::Result<Shipment> {
        if self.id.trim().is_empty() {
            anyhow::bail!("shipment without id");
        }

        Ok(Shipment {
            id: self.id.trim().to_string(),
            carrier: canonical_carrier(&self.carrier),
            status: ShipmentStatus::from(self.status.as_str()),
            destination: self.destination.trim().to_string(),
            origin: self.origin.trim().to_string(),
            estimated_delivery: parse_datetime(&self.estimated_delivery)?,
            last_update: parse_datetime(&self.last_update)?,
            order_value: self.order_value,
            product_type: self
                .product_type
                .as_deref()
                .map(ProductType::from)
                .unwrap_or_default(),
        })
    }
}

/// Parse the date formats seen in carrier exports. Empty input is `None`.
pub fn parse_datetime(raw: &str) -> anyhow::Result<Option<NaiveDateTime>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Some(dt));
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(date.and_hms_opt(0, 0, 0));
        }
    }
    anyhow::bail!("unrecognised date: {}", raw)
}

/// Read shipments from CSV, skipping (and logging) rows that fail to parse
pub fn load_shipments_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Shipment>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut shipments = Vec::new();
    let mut error_count = 0;

    for (i, record) in reader.deserialize::<CsvShipmentRecord>().enumerate() {
        let parsed = record
            .map_err(anyhow::Error::from)
            .and_then(|r| r.to_shipment());
        match parsed {
            Ok(shipment) => shipments.push(shipment),
            Err(e) => {
                if error_count < 5 {
                    warn!("Failed to parse shipment row {}: {}", i + 1, e);
                }
                error_count += 1;
            }
        }
    }

    info!(
        "Loaded {} shipments from CSV ({} rows skipped)",
        shipments.len(),
        error_count
    );
    Ok(shipments)
}
