//! Monthly registry dump loading.
//!
//! Reads one `{registry}_{year}_{month}_01.json` dump, reconstructs its five
//! relations as typed records and joins them into [`DenormalizedRow`]s.

use std::collections::{BTreeMap, HashMap};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use evolution_core::error::{EvolutionError, Result};
use evolution_core::models::{normalize_asn, DenormalizedRow, MonthKey};
use evolution_core::settings::DriverConfig;
use evolution_core::traffic::capacity_from_value;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

// ── Relation records ──────────────────────────────────────────────────────────

/// Organization relation (`org`).
#[derive(Debug, Clone, Deserialize)]
pub struct OrgRecord {
    #[serde(rename = "id")]
    pub org_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Network relation (`net`).
#[derive(Debug, Clone, Deserialize)]
pub struct NetRecord {
    #[serde(rename = "id")]
    pub net_id: u64,
    pub org_id: u64,
    #[serde(deserialize_with = "deserialize_asn")]
    pub asn: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub info_type: Option<String>,
    #[serde(default)]
    pub info_traffic: Option<String>,
}

/// Network ↔ facility link (`netfac`).
#[derive(Debug, Clone, Deserialize)]
pub struct NetFacRecord {
    #[serde(rename = "id")]
    pub netfac_id: u64,
    pub net_id: u64,
    pub fac_id: u64,
    #[serde(default, deserialize_with = "deserialize_opt_asn")]
    pub local_asn: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Network ↔ exchange-point link (`netixlan`).
#[derive(Debug, Clone, Deserialize)]
pub struct NetIxLanRecord {
    #[serde(rename = "id")]
    pub netixlan_id: u64,
    pub net_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ipaddr4: Option<String>,
    #[serde(default)]
    pub speed: Option<Value>,
}

/// Facility relation (`fac`).
#[derive(Debug, Clone, Deserialize)]
pub struct FacRecord {
    #[serde(rename = "id")]
    pub fac_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Relation<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RawDump {
    org: Relation<OrgRecord>,
    net: Relation<NetRecord>,
    netfac: Relation<NetFacRecord>,
    netixlan: Relation<NetIxLanRecord>,
    fac: Relation<FacRecord>,
}

fn deserialize_asn<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    normalize_asn(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid asn: {}", value)))
}

fn deserialize_opt_asn<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(normalize_asn))
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// The five relations of one dump.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    pub orgs: Vec<OrgRecord>,
    pub nets: Vec<NetRecord>,
    pub netfacs: Vec<NetFacRecord>,
    pub netixlans: Vec<NetIxLanRecord>,
    pub facs: Vec<FacRecord>,
}

/// One month of the registry, relations plus their join.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub month: MonthKey,
    pub relations: Relations,
    pub rows: Vec<DenormalizedRow>,
}

impl Snapshot {
    pub fn from_relations(month: MonthKey, relations: Relations) -> Self {
        let rows = join_relations(&relations);
        Self {
            month,
            relations,
            rows,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load the dump for `month`.
///
/// Returns [`EvolutionError::MonthNotFound`] when the file does not exist
/// (normal: not every month was archived) and
/// [`EvolutionError::SnapshotMalformed`] when it cannot be reconstructed.
pub fn load_snapshot(config: &DriverConfig, month: MonthKey) -> Result<Snapshot> {
    let path = config.snapshot_path(month.year(), month.month());

    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EvolutionError::MonthNotFound { month, path });
        }
        Err(source) => return Err(EvolutionError::FileRead { path, source }),
    };

    let snapshot = parse_snapshot(month, BufReader::new(file))?;
    debug!(
        "Snapshot {}: {} orgs, {} nets, {} netfacs, {} netixlans, {} facs -> {} rows",
        month,
        snapshot.relations.orgs.len(),
        snapshot.relations.nets.len(),
        snapshot.relations.netfacs.len(),
        snapshot.relations.netixlans.len(),
        snapshot.relations.facs.len(),
        snapshot.rows.len(),
    );
    Ok(snapshot)
}

/// Parse a dump document and join its relations.
pub fn parse_snapshot(month: MonthKey, reader: impl Read) -> Result<Snapshot> {
    let raw: RawDump =
        serde_json::from_reader(reader).map_err(|e| EvolutionError::SnapshotMalformed {
            month,
            reason: e.to_string(),
        })?;

    let relations = Relations {
        orgs: raw.org.data,
        nets: raw.net.data,
        netfacs: raw.netfac.data,
        netixlans: raw.netixlan.data,
        facs: raw.fac.data,
    };
    Ok(Snapshot::from_relations(month, relations))
}

/// Find every dump for `registry_name` directly under `dump_dir`.
pub fn discover_snapshots(dump_dir: &Path, registry_name: &str) -> BTreeMap<MonthKey, PathBuf> {
    let mut found = BTreeMap::new();
    if !dump_dir.exists() {
        warn!("Dump directory does not exist: {}", dump_dir.display());
        return found;
    }

    let pattern = format!(r"^{}_(\d{{4}})_(\d{{2}})_01\.json$", regex::escape(registry_name));
    let Ok(re) = Regex::new(&pattern) else {
        return found;
    };

    for entry in walkdir::WalkDir::new(dump_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(cap) = re.captures(name) else {
            continue;
        };
        let (Ok(year), Ok(month)) = (cap[1].parse::<i32>(), cap[2].parse::<u32>()) else {
            continue;
        };
        if let Ok(key) = MonthKey::new(year, month) {
            found.insert(key, entry.into_path());
        }
    }

    found
}

// ── Join ──────────────────────────────────────────────────────────────────────

/// Inner-join Network ⋈ Organization ⋈ NetworkFacility ⋈ NetworkExchangeLink
/// ⋈ Facility.
///
/// Rows come out in network order, then facility-link order, then
/// exchange-link order. A network without both a facility link and an
/// exchange link contributes nothing.
pub fn join_relations(relations: &Relations) -> Vec<DenormalizedRow> {
    let orgs: HashMap<u64, &OrgRecord> =
        relations.orgs.iter().map(|o| (o.org_id, o)).collect();
    let facs: HashMap<u64, &FacRecord> =
        relations.facs.iter().map(|f| (f.fac_id, f)).collect();

    let mut netfacs_by_net: HashMap<u64, Vec<&NetFacRecord>> = HashMap::new();
    for netfac in &relations.netfacs {
        netfacs_by_net.entry(netfac.net_id).or_default().push(netfac);
    }
    let mut links_by_net: HashMap<u64, Vec<&NetIxLanRecord>> = HashMap::new();
    for link in &relations.netixlans {
        links_by_net.entry(link.net_id).or_default().push(link);
    }

    let mut rows = Vec::new();
    for net in &relations.nets {
        let Some(org) = orgs.get(&net.org_id) else {
            continue;
        };
        let (Some(netfacs), Some(links)) =
            (netfacs_by_net.get(&net.net_id), links_by_net.get(&net.net_id))
        else {
            continue;
        };

        for netfac in netfacs {
            let Some(fac) = facs.get(&netfac.fac_id) else {
                continue;
            };
            // Newer dumps dropped city/country from the facility link.
            let city = clean(&netfac.city).or_else(|| clean(&fac.city));
            let country = clean(&netfac.country).or_else(|| clean(&fac.country));

            for link in links {
                rows.push(DenormalizedRow {
                    asn: net.asn.clone(),
                    org_name: clean(&org.name),
                    info_type: clean(&net.info_type),
                    facility_name: clean(&fac.name),
                    city: city.clone(),
                    country: country.clone(),
                    local_asn: netfac.local_asn.clone(),
                    exchange_name: clean(&link.name),
                    ipaddr4: clean(&link.ipaddr4),
                    capacity: link.speed.as_ref().and_then(capacity_from_value),
                });
            }
        }
    }
    rows
}

/// Trimmed text, with empty strings treated as absent.
pub(crate) fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
