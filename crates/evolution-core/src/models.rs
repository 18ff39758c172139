use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::EvolutionError;
use crate::traffic::Mbps;

// ── MonthKey ──────────────────────────────────────────────────────────────────

/// The single time axis of every series: one registry dump per month.
///
/// Ordering is chronological (year, then month). The external form is
/// `"{year}_{month:02}"`, which also sorts lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Build a key, rejecting months outside `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self, EvolutionError> {
        if !(1..=12).contains(&month) {
            return Err(EvolutionError::InvalidMonthKey(format!(
                "{}_{:02}",
                year, month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Every month from January of `start_year` to December of `end_year`,
    /// in chronological order. Empty when `start_year > end_year`.
    pub fn range(start_year: i32, end_year: i32) -> impl Iterator<Item = MonthKey> {
        (start_year..=end_year)
            .flat_map(|year| (1..=12).map(move |month| MonthKey { year, month }))
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = EvolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EvolutionError::InvalidMonthKey(s.to_string());
        let (year, month) = s.split_once('_').ok_or_else(invalid)?;
        if month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).map_err(|_| invalid())
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── CityId ────────────────────────────────────────────────────────────────────

/// A city disambiguated by its country, e.g. `Paris-FR` vs `Paris-US`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CityId {
    pub city: String,
    pub country: String,
}

impl CityId {
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
        }
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.city, self.country)
    }
}

impl FromStr for CityId {
    type Err = EvolutionError;

    /// Splits on the last `-`: city names may contain dashes, ISO codes do not.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('-') {
            Some((city, country)) if !city.is_empty() && !country.is_empty() => {
                Ok(CityId::new(city, country))
            }
            _ => Err(EvolutionError::InvalidCityId(s.to_string())),
        }
    }
}

impl Serialize for CityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── DenormalizedRow ───────────────────────────────────────────────────────────

/// One (network, facility link, exchange link) triple present in a month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DenormalizedRow {
    /// Numbered-network identifier of the network, canonical string form.
    pub asn: String,
    /// Name of the owning organization.
    #[serde(default)]
    pub org_name: Option<String>,
    /// Network type tag, `"Content"` for content providers.
    #[serde(default)]
    pub info_type: Option<String>,
    /// Facility name from the facility relation.
    #[serde(default)]
    pub facility_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// ISO-3166 alpha-2 country code.
    #[serde(default)]
    pub country: Option<String>,
    /// Network identifier declared on the facility link.
    #[serde(default)]
    pub local_asn: Option<String>,
    /// Exchange-point name from the exchange link.
    #[serde(default)]
    pub exchange_name: Option<String>,
    /// IPv4 interconnect address on the exchange fabric.
    #[serde(default)]
    pub ipaddr4: Option<String>,
    /// Declared capacity; `None` when unknown.
    #[serde(default)]
    pub capacity: Option<Mbps>,
}

impl DenormalizedRow {
    /// The `City-CC` identifier, present only when both parts are.
    pub fn city_id(&self) -> Option<CityId> {
        match (self.city.as_deref(), self.country.as_deref()) {
            (Some(city), Some(country)) => Some(CityId::new(city, country)),
            _ => None,
        }
    }
}

// ── ASN normalization ─────────────────────────────────────────────────────────

/// Canonical string form of a numbered-network identifier.
///
/// Dumps carry ASNs as JSON integers, floats (`15169.0`) or strings; all
/// of them map to the plain decimal string so that joins and filters agree.
pub fn normalize_asn(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.is_finite() {
                    Some(format!("{}", f as i64))
                } else {
                    Some(f.to_string())
                }
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.strip_prefix("AS").unwrap_or(trimmed).to_string())
            }
        }
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── MonthKey ──────────────────────────────────────────────────────────────

    #[test]
    fn test_month_key_display_zero_padded() {
        assert_eq!(MonthKey::new(2023, 1).unwrap().to_string(), "2023_01");
        assert_eq!(MonthKey::new(2019, 12).unwrap().to_string(), "2019_12");
    }

    #[test]
    fn test_month_key_rejects_invalid_month() {
        assert!(MonthKey::new(2023, 0).is_err());
        assert!(MonthKey::new(2023, 13).is_err());
    }

    #[test]
    fn test_month_key_parse() {
        let key: MonthKey = "2021_07".parse().unwrap();
        assert_eq!(key.year(), 2021);
        assert_eq!(key.month(), 7);
        assert!("2021-07".parse::<MonthKey>().is_err());
        assert!("2021_7".parse::<MonthKey>().is_err());
        assert!("2021_13".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_month_key_ordering_is_chronological() {
        let a = MonthKey::new(2022, 12).unwrap();
        let b = MonthKey::new(2023, 1).unwrap();
        let c = MonthKey::new(2023, 10).unwrap();
        assert!(a < b && b < c);
        assert!(a.to_string() < b.to_string() && b.to_string() < c.to_string());
    }

    #[test]
    fn test_month_key_range() {
        let months: Vec<String> = MonthKey::range(2022, 2023)
            .map(|m| m.to_string())
            .collect();
        assert_eq!(months.len(), 24);
        assert_eq!(months[0], "2022_01");
        assert_eq!(months[12], "2023_01");
        assert_eq!(months[23], "2023_12");
        assert_eq!(MonthKey::range(2024, 2023).count(), 0);
    }

    #[test]
    fn test_month_key_serde_as_string() {
        let key = MonthKey::new(2020, 3).unwrap();
        assert_eq!(serde_json::to_value(key).unwrap(), serde_json::json!("2020_03"));
        let back: MonthKey = serde_json::from_str("\"2020_03\"").unwrap();
        assert_eq!(back, key);
    }

    // ── CityId ────────────────────────────────────────────────────────────────

    #[test]
    fn test_city_id_display_and_parse() {
        let id = CityId::new("Frankfurt", "DE");
        assert_eq!(id.to_string(), "Frankfurt-DE");
        let parsed: CityId = "Wilkes-Barre-US".parse().unwrap();
        assert_eq!(parsed.city, "Wilkes-Barre");
        assert_eq!(parsed.country, "US");
        assert!("Nowhere".parse::<CityId>().is_err());
    }

    #[test]
    fn test_city_id_as_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(CityId::new("Paris", "FR"), 1);
        let value = serde_json::to_value(&map).unwrap();
        assert_eq!(value, serde_json::json!({"Paris-FR": 1}));
    }

    #[test]
    fn test_row_city_id_requires_both_parts() {
        let mut row = DenormalizedRow {
            city: Some("Tokyo".to_string()),
            ..Default::default()
        };
        assert!(row.city_id().is_none());
        row.country = Some("JP".to_string());
        assert_eq!(row.city_id(), Some(CityId::new("Tokyo", "JP")));
    }

    // ── normalize_asn ─────────────────────────────────────────────────────────

    #[test]
    fn test_normalize_asn_variants() {
        use serde_json::json;
        assert_eq!(normalize_asn(&json!(15169)), Some("15169".to_string()));
        assert_eq!(normalize_asn(&json!(15169.0)), Some("15169".to_string()));
        assert_eq!(normalize_asn(&json!("15169")), Some("15169".to_string()));
        assert_eq!(normalize_asn(&json!(" AS32934 ")), Some("32934".to_string()));
        assert_eq!(normalize_asn(&json!("")), None);
        assert_eq!(normalize_asn(&json!(null)), None);
    }
}
