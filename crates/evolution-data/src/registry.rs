//! Static registries loaded once per run: the hypergiant → ASN list and the
//! optional ASN → country mapping.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::BufRead;
use std::path::Path;

use evolution_core::error::{EvolutionError, Result};
use evolution_core::models::normalize_asn;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

// ── HypergiantKey ─────────────────────────────────────────────────────────────

/// A tracked operator and the numbered networks it controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypergiantKey {
    pub name: String,
    pub asns: BTreeSet<String>,
}

impl HypergiantKey {
    pub fn new<I, S>(name: impl Into<String>, asns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            asns: asns.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHypergiant {
    #[serde(default)]
    asns: Vec<Value>,
}

// ── HypergiantRegistry ────────────────────────────────────────────────────────

/// Immutable set of tracked hypergiants, iterated in key order.
#[derive(Debug, Clone, Default)]
pub struct HypergiantRegistry {
    entries: BTreeMap<String, HypergiantKey>,
}

impl HypergiantRegistry {
    /// Load `{"google": {"asns": [15169, ...]}, ...}` from `path`.
    ///
    /// When `focus` is non-empty only the named keys are kept.
    pub fn load(path: &Path, focus: &[String]) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EvolutionError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&content)?;
        Self::from_value(value, focus)
    }

    pub fn from_value(value: Value, focus: &[String]) -> Result<Self> {
        let raw: BTreeMap<String, RawHypergiant> = serde_json::from_value(value)
            .map_err(|e| EvolutionError::Registry(e.to_string()))?;

        for key in focus {
            if !raw.contains_key(key) {
                warn!("Focus hypergiant {:?} is not in the registry", key);
            }
        }

        let entries: BTreeMap<String, HypergiantKey> = raw
            .into_iter()
            .filter(|(name, _)| focus.is_empty() || focus.contains(name))
            .map(|(name, entry)| {
                let asns: BTreeSet<String> = entry.asns.iter().filter_map(normalize_asn).collect();
                if asns.is_empty() {
                    debug!("Hypergiant {} has no ASNs", name);
                }
                (name.clone(), HypergiantKey { name, asns })
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &HypergiantKey> {
        self.entries.values()
    }

    pub fn get(&self, name: &str) -> Option<&HypergiantKey> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<HypergiantKey> for HypergiantRegistry {
    fn from_iter<T: IntoIterator<Item = HypergiantKey>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|k| (k.name.clone(), k)).collect(),
        }
    }
}

// ── AsnCountryMap ─────────────────────────────────────────────────────────────

/// ASN → ISO-3166 alpha-2 country, used to place content networks.
#[derive(Debug, Clone, Default)]
pub struct AsnCountryMap {
    countries: HashMap<String, String>,
}

impl AsnCountryMap {
    /// Read JSON lines of the form `{"asn": 15169, "country": {"iso": "US"}}`.
    ///
    /// Blank and malformed lines are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| EvolutionError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = std::io::BufReader::new(file);

        let mut countries = HashMap::new();
        let mut skipped = 0u64;
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let data: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Failed to parse JSON line in {}: {}", path.display(), e);
                    skipped += 1;
                    continue;
                }
            };
            let asn = data.get("asn").and_then(normalize_asn);
            let iso = data
                .get("country")
                .and_then(|c| c.get("iso"))
                .and_then(|v| v.as_str());
            match (asn, iso) {
                (Some(asn), Some(iso)) if !iso.is_empty() => {
                    countries.insert(asn, iso.to_string());
                }
                _ => skipped += 1,
            }
        }

        debug!(
            "ASN country map {}: {} entries, {} skipped",
            path.display(),
            countries.len(),
            skipped
        );
        Ok(Self { countries })
    }

    pub fn get(&self, asn: &str) -> Option<&str> {
        self.countries.get(asn).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

impl<A: Into<String>, C: Into<String>> FromIterator<(A, C)> for AsnCountryMap {
    fn from_iter<T: IntoIterator<Item = (A, C)>>(iter: T) -> Self {
        Self {
            countries: iter
                .into_iter()
                .map(|(a, c)| (a.into(), c.into()))
                .collect(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_registry() -> Value {
        json!({
            "google": {"asns": [15169, "36040"]},
            "netflix": {"asns": [2906], "name": "Netflix"},
            "empty": {}
        })
    }

    // ── HypergiantRegistry ────────────────────────────────────────────────────

    #[test]
    fn test_registry_normalizes_asns() {
        let registry = HypergiantRegistry::from_value(sample_registry(), &[]).unwrap();
        assert_eq!(registry.len(), 3);
        let google = registry.get("google").unwrap();
        assert!(google.asns.contains("15169"));
        assert!(google.asns.contains("36040"));
    }

    #[test]
    fn test_registry_missing_asns_is_empty_set() {
        let registry = HypergiantRegistry::from_value(sample_registry(), &[]).unwrap();
        assert!(registry.get("empty").unwrap().asns.is_empty());
    }

    #[test]
    fn test_registry_focus_filters() {
        let focus = vec!["netflix".to_string(), "unknown".to_string()];
        let registry = HypergiantRegistry::from_value(sample_registry(), &focus).unwrap();
        assert_eq!(registry.names(), vec!["netflix"]);
    }

    #[test]
    fn test_registry_iterates_in_key_order() {
        let registry = HypergiantRegistry::from_value(sample_registry(), &[]).unwrap();
        let names: Vec<&str> = registry.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["empty", "google", "netflix"]);
    }

    #[test]
    fn test_registry_rejects_non_object() {
        let err = HypergiantRegistry::from_value(json!([1, 2, 3]), &[]).unwrap_err();
        assert!(matches!(err, EvolutionError::Registry(_)));
    }

    #[test]
    fn test_registry_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hypergiants.json");
        std::fs::write(&path, sample_registry().to_string()).unwrap();
        let registry = HypergiantRegistry::load(&path, &[]).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_load_missing_file() {
        let err = HypergiantRegistry::load(Path::new("/no/such/hg.json"), &[]).unwrap_err();
        assert!(matches!(err, EvolutionError::FileRead { .. }));
    }

    // ── AsnCountryMap ─────────────────────────────────────────────────────────

    #[test]
    fn test_asn_country_map_load_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("asns.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", json!({"asn": 15169, "country": {"iso": "US"}})).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{broken").unwrap();
        writeln!(file, "{}", json!({"asn": 2906})).unwrap();
        writeln!(file, "{}", json!({"asn": "3320", "country": {"iso": "DE"}})).unwrap();

        let map = AsnCountryMap::load(&path).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("15169"), Some("US"));
        assert_eq!(map.get("3320"), Some("DE"));
        assert_eq!(map.get("2906"), None);
    }

    #[test]
    fn test_asn_country_map_from_pairs() {
        let map: AsnCountryMap = [("1", "FR")].into_iter().collect();
        assert_eq!(map.get("1"), Some("FR"));
        assert!(!map.is_empty());
    }
}
