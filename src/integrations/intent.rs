//! Command intents: parsing provider JSON and the keyword fallback

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::carrier_names::{canonical_carrier, known_carriers};
use crate::cities::{find_known_city, normalize_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    TrackShipment,
    GenerateReport,
    RecommendCarrier,
    RiskAnalysis,
    SendMessage,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandIntent {
    pub intent: IntentKind,
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reply: Option<String>,
}

/// Keyword groups, checked in order
const KEYWORDS: &[(IntentKind, &[&str])] = &[
    (IntentKind::SendMessage, &["ENVIAR MENSAJE", "WHATSAPP", "NOTIFICAR", "ESCRIBIR AL CLIENTE"]),
    (IntentKind::RiskAnalysis, &["RIESGO", "PROBABILIDAD"]),
    (IntentKind::RecommendCarrier, &["RECOMIENDA", "RECOMENDAR", "MEJOR TRANSPORTADORA", "QUE TRANSPORTADORA"]),
    (IntentKind::GenerateReport, &["REPORTE", "INFORME", "RESUMEN"]),
    (IntentKind::TrackShipment, &["RASTREAR", "RASTREO", "GUIA", "SEGUIMIENTO", "DONDE ESTA"]),
];

/// Extract the first JSON object in a provider reply
pub fn parse_intent_json(text: &str) -> Option<CommandIntent> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let mut intent: CommandIntent = serde_json::from_str(&text[start..=end]).ok()?;
    intent.confidence = intent.confidence.clamp(0.0, 1.0);
    Some(intent)
}

fn extract_guide(normalized: &str) -> Option<String> {
    normalized
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|token| token.len() >= 6 && token.chars().filter(|c| c.is_ascii_digit()).count() >= 6)
        .map(|t| t.to_string())
}

fn extract_phone(normalized: &str) -> Option<String> {
    let digits: String = normalized
        .split_whitespace()
        .find(|token| {
            let d = token.trim_start_matches('+');
            d.len() >= 10 && d.chars().all(|c| c.is_ascii_digit())
        })?
        .to_string();
    Some(digits)
}

fn extract_carrier(normalized: &str) -> Option<String> {
    let words: Vec<&str> = normalized
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    known_carriers()
        .into_iter()
        .find(|carrier| words.contains(carrier))
        .map(|c| c.to_string())
        .or_else(|| {
            words
                .iter()
                .map(|w| canonical_carrier(w))
                .find(|c| known_carriers().contains(&c.as_str()))
        })
}

/// Keyword classification used when no provider reply can be parsed
pub fn classify_locally(command: &str) -> CommandIntent {
    let normalized = normalize_text(command);

    let intent = KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| normalized.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(IntentKind::Unknown);

    let mut entities = BTreeMap::new();
    if let Some(guide) = extract_guide(&normalized) {
        entities.insert("guide".to_string(), guide);
    }
    if let Some(city) = find_known_city(&normalized) {
        entities.insert("city".to_string(), city.to_string());
    }
    if let Some(carrier) = extract_carrier(&normalized) {
        entities.insert("carrier".to_string(), carrier);
    }
    if intent == IntentKind::SendMessage {
        if let Some(phone) = extract_phone(&normalized) {
            entities.insert("phone".to_string(), phone);
        }
    }

    // a bare guide number is a tracking request
    let intent = match intent {
        IntentKind::Unknown if entities.contains_key("guide") => IntentKind::TrackShipment,
        other => other,
    };

    CommandIntent {
        confidence: if intent == IntentKind::Unknown { 0.0 } else { 0.6 },
        intent,
        entities,
        reply: None,
    }
}
