//! Carrier (transportadora) name mapping
//! Maps the spellings found in carrier exports and spreadsheets to one canonical name

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::cities::normalize_text;

/// Alias (normalised) -> canonical carrier name
pub static CARRIER_ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    m.insert("SERVIENTREGA", "SERVIENTREGA");
    m.insert("SERVI ENTREGA", "SERVIENTREGA");
    m.insert("SERVIENTREGA S.A.", "SERVIENTREGA");

    m.insert("INTERRAPIDISIMO", "INTERRAPIDISIMO");
    m.insert("INTER RAPIDISIMO", "INTERRAPIDISIMO");
    m.insert("INTER", "INTERRAPIDISIMO");

    m.insert("COORDINADORA", "COORDINADORA");
    m.insert("COORDINADORA MERCANTIL", "COORDINADORA");

    m.insert("ENVIA", "ENVIA");
    m.insert("ENVIA COLVANES", "ENVIA");
    m.insert("COLVANES", "ENVIA");

    m.insert("TCC", "TCC");
    m.insert("TCC S.A.", "TCC");

    m.insert("DEPRISA", "DEPRISA");
    m.insert("AVIANCA DEPRISA", "DEPRISA");

    m.insert("472", "472");
    m.insert("4-72", "472");
    m.insert("SERVICIOS POSTALES NACIONALES", "472");

    m.insert("VELOCES", "VELOCES");
    m.insert("DOMINA", "DOMINA");

    m
});

/// Canonical carrier name; unknown carriers are returned normalised
pub fn canonical_carrier(name: &str) -> String {
    let normalized = normalize_text(name);
    CARRIER_ALIASES
        .get(normalized.as_str())
        .map(|s| s.to_string())
        .unwrap_or(normalized)
}

/// Canonical carriers, for generators and templates
pub fn known_carriers() -> Vec<&'static str> {
    let mut carriers: Vec<&'static str> = CARRIER_ALIASES.values().copied().collect();
    carriers.sort_unstable();
    carriers.dedup();
    carriers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_alias() {
        assert_eq!(canonical_carrier("Inter Rapidísimo"), "INTERRAPIDISIMO");
        assert_eq!(canonical_carrier("envía"), "ENVIA");
        assert_eq!(canonical_carrier("4-72"), "472");
    }

    #[test]
    fn test_unknown_carrier() {
        assert_eq!(canonical_carrier("  mensajeros  urbanos "), "MENSAJEROS URBANOS");
    }

    #[test]
    fn test_known_carriers_are_unique() {
        let carriers = known_carriers();
        assert!(carriers.contains(&"COORDINADORA"));
        assert_eq!(carriers.iter().filter(|c| **c == "ENVIA").count(), 1);
    }
}
