//! Colombian city names and address parsing
//! Normalises free-text city/address strings to the keys used by the historical data

use std::sync::LazyLock;

/// Destination cities recognised inside free-text addresses
pub static KNOWN_CITIES: &[&str] = &[
    "BOGOTA",
    "MEDELLIN",
    "CALI",
    "BARRANQUILLA",
    "CARTAGENA",
    "CUCUTA",
    "BUCARAMANGA",
    "PEREIRA",
    "SANTA MARTA",
    "IBAGUE",
    "PASTO",
    "MANIZALES",
    "NEIVA",
    "VILLAVICENCIO",
    "ARMENIA",
    "VALLEDUPAR",
    "MONTERIA",
    "SINCELEJO",
    "POPAYAN",
    "TUNJA",
    "RIOHACHA",
    "BELLO",
    "SOACHA",
];

/// Known cities, longest first so "SANTA MARTA" wins over shorter overlaps
static CITIES_BY_LENGTH: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut cities = KNOWN_CITIES.to_vec();
    cities.sort_by_key(|c| std::cmp::Reverse(c.len()));
    cities
});

pub const UNKNOWN_CITY: &str = "DESCONOCIDA";

fn strip_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'A',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'ñ' | 'Ñ' => 'N',
        other => other.to_ascii_uppercase(),
    }
}

/// Upper case, accents removed, whitespace collapsed ("  Bogotá d.c." -> "BOGOTA D.C.")
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(|word| word.chars().map(strip_accent).collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find a known city mentioned anywhere in the text
pub fn find_known_city(text: &str) -> Option<&'static str> {
    let normalized = normalize_text(text);
    CITIES_BY_LENGTH.iter().copied().find(|city| {
        normalized
            .split(|c: char| !c.is_ascii_alphanumeric() && c != ' ')
            .any(|segment| contains_word(segment, city))
    })
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let words: Vec<&str> = haystack.split(' ').filter(|w| !w.is_empty()).collect();
    let needle_words: Vec<&str> = needle.split(' ').collect();
    words
        .windows(needle_words.len())
        .any(|window| window == needle_words.as_slice())
}

/// Extract the city from a destination address.
///
/// Comma-separated parts are checked against the known city list (last part
/// first, where the city usually sits); otherwise the second part is taken as
/// the city, and single-part text falls back to a lookup over the whole string.
pub fn extract_city(address: &str) -> String {
    let parts: Vec<&str> = address
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        return UNKNOWN_CITY.to_string();
    }

    for part in parts.iter().rev() {
        if let Some(city) = find_known_city(part) {
            return city.to_string();
        }
    }

    match parts.as_slice() {
        [single] => normalize_text(single),
        [_, city, ..] => normalize_text(city),
        [] => UNKNOWN_CITY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_text("  Bogotá   D.C. "), "BOGOTA D.C.");
        assert_eq!(normalize_text("Medellín"), "MEDELLIN");
        assert_eq!(normalize_text("Nariño"), "NARINO");
    }

    #[test]
    fn test_extract_from_comma_address() {
        assert_eq!(extract_city("Calle 10 #5-20, Medellín, Antioquia"), "MEDELLIN");
        assert_eq!(extract_city("Cra 7 # 12-30, Santa Marta"), "SANTA MARTA");
    }

    #[test]
    fn test_extract_second_part_when_unknown() {
        assert_eq!(extract_city("Vereda El Tigre, Yopal, Casanare"), "YOPAL");
    }

    #[test]
    fn test_fallback_lookup_without_commas() {
        assert_eq!(extract_city("Barrio El Prado Barranquilla"), "BARRANQUILLA");
        assert_eq!(extract_city("Leticia"), "LETICIA");
    }

    #[test]
    fn test_word_boundaries() {
        // "CALIMA" must not be read as CALI
        assert_eq!(find_known_city("Lago Calima"), None);
        assert_eq!(find_known_city("centro de cali"), Some("CALI"));
    }

    #[test]
    fn test_empty_address() {
        assert_eq!(extract_city(""), UNKNOWN_CITY);
        assert_eq!(extract_city(" , "), UNKNOWN_CITY);
    }
}
