//! Per-hypergiant monthly statistics and topology change ledgers.
//!
//! [`summarize_month`] is a pure function of one month's rows.
//! [`HypergiantHistory::apply`] stores that summary and updates the
//! cumulative first-appearance / first-disappearance ledgers, which is why
//! months must be applied in chronological order.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use evolution_core::error::{EvolutionError, Result};
use evolution_core::models::{CityId, DenormalizedRow, MonthKey};
use evolution_core::traffic::Mbps;
use serde::{Serialize, Serializer};
use tracing::debug;

// ── MonthlySummary ────────────────────────────────────────────────────────────

/// Everything derived from one hypergiant's rows in one month.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// Distinct facility names.
    pub fac_count: usize,
    /// Sum of known per-row capacities.
    pub capacity: Mbps,
    /// Exchange name → capacity, each link capacity counted once.
    pub capacities_ixp: BTreeMap<String, Mbps>,
    /// Distinct exchange names.
    pub ixp_count: usize,
    /// Distinct raw city names.
    pub city_count: usize,
    pub country_count: usize,
    /// Distinct `City-CC` identifiers in first-seen order.
    pub cities: Vec<CityId>,
    pub countries: Vec<String>,
    pub facilities: Vec<String>,
    /// Facility → distinct local ASNs seen there.
    pub asns_per_facility: BTreeMap<String, Vec<String>>,
}

/// Summarize one month of rows for one hypergiant.
pub fn summarize_month(rows: &[&DenormalizedRow]) -> MonthlySummary {
    let facilities = distinct(rows.iter().filter_map(|r| r.facility_name.clone()));
    let cities = distinct(rows.iter().filter_map(|r| r.city_id()));
    let countries = distinct(rows.iter().filter_map(|r| r.country.clone()));

    let city_count = rows
        .iter()
        .filter_map(|r| r.city.as_deref())
        .collect::<HashSet<_>>()
        .len();
    let ixp_count = rows
        .iter()
        .filter_map(|r| r.exchange_name.as_deref())
        .collect::<HashSet<_>>()
        .len();

    let mut asns_per_facility: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        let Some(facility) = &row.facility_name else {
            continue;
        };
        let asns = asns_per_facility.entry(facility.clone()).or_default();
        if let Some(asn) = &row.local_asn {
            if !asns.contains(asn) {
                asns.push(asn.clone());
            }
        }
    }

    MonthlySummary {
        fac_count: facilities.len(),
        capacity: rows.iter().filter_map(|r| r.capacity).sum(),
        capacities_ixp: exchange_capacities(rows),
        ixp_count,
        city_count,
        country_count: countries.len(),
        cities,
        countries,
        facilities,
        asns_per_facility,
    }
}

/// Capacity per exchange.
///
/// Rows are grouped by (exchange, interconnect address); within a group each
/// distinct declared capacity counts once, so the join's duplicate rows do
/// not inflate the figure. Group totals are then summed per exchange.
/// Links missing either key belong to no group and add nothing.
fn exchange_capacities(rows: &[&DenormalizedRow]) -> BTreeMap<String, Mbps> {
    let mut per_link: BTreeMap<(&str, &str), Vec<Mbps>> = BTreeMap::new();
    for row in rows {
        let (Some(name), Some(addr)) = (row.exchange_name.as_deref(), row.ipaddr4.as_deref())
        else {
            continue;
        };
        let speeds = per_link.entry((name, addr)).or_default();
        if let Some(capacity) = row.capacity {
            if !speeds.contains(&capacity) {
                speeds.push(capacity);
            }
        }
    }

    let mut per_exchange: BTreeMap<String, Mbps> = BTreeMap::new();
    for ((name, _), speeds) in per_link {
        *per_exchange.entry(name.to_string()).or_default() += speeds.iter().sum::<Mbps>();
    }
    per_exchange
}

/// Distinct items, keeping first-seen order.
fn distinct<T: Eq + Hash + Clone>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

// ── Ledgers ───────────────────────────────────────────────────────────────────

/// First time a city was observed: the facility it was seen at, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    pub facility: String,
    pub month: MonthKey,
}

/// Written as the pair `[facility, month]`.
impl Serialize for Appearance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.facility, &self.month).serialize(serializer)
    }
}

/// Ledger events produced by one [`HypergiantHistory::apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthUpdate {
    pub appeared: Vec<CityId>,
    pub disappeared: Vec<CityId>,
}

impl MonthUpdate {
    pub fn is_quiet(&self) -> bool {
        self.appeared.is_empty() && self.disappeared.is_empty()
    }
}

// ── HypergiantHistory ─────────────────────────────────────────────────────────

/// Cumulative record of one hypergiant across the whole window.
///
/// Months with no rows are simply absent; nothing is zero-filled.
#[derive(Debug, Clone, Default)]
pub struct HypergiantHistory {
    months: BTreeMap<MonthKey, MonthlySummary>,
    first_appearance: BTreeMap<CityId, Appearance>,
    first_disappearance: BTreeMap<CityId, MonthKey>,
    last_month: Option<MonthKey>,
}

impl HypergiantHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `month` from `rows` and update the ledgers.
    ///
    /// A city enters the appearance ledger the first month it is seen and is
    /// never reassigned. A city already in the appearance ledger but absent
    /// this month enters the disappearance ledger, once; the entry is not
    /// cleared if the city comes back.
    ///
    /// Re-applying the latest month is allowed; applying an earlier month
    /// fails with [`EvolutionError::OutOfOrderMonth`]. An empty `rows` means
    /// no presence was registered that month: nothing is recorded and no city
    /// is marked as disappeared.
    pub fn apply(&mut self, month: MonthKey, rows: &[&DenormalizedRow]) -> Result<MonthUpdate> {
        if let Some(last) = self.last_month {
            if month < last {
                return Err(EvolutionError::OutOfOrderMonth { last, got: month });
            }
        }
        if rows.is_empty() {
            debug!("{}: no rows, nothing to record", month);
            return Ok(MonthUpdate::default());
        }

        let summary = summarize_month(rows);
        let mut update = MonthUpdate::default();

        for city in &summary.cities {
            if self.first_appearance.contains_key(city) {
                continue;
            }
            let facility = rows
                .iter()
                .find(|r| r.city_id().as_ref() == Some(city))
                .and_then(|r| r.facility_name.clone())
                .unwrap_or_default();
            self.first_appearance
                .insert(city.clone(), Appearance { facility, month });
            update.appeared.push(city.clone());
        }

        let currently_seen: HashSet<&CityId> = summary.cities.iter().collect();
        for city in self.first_appearance.keys() {
            if currently_seen.contains(city) || self.first_disappearance.contains_key(city) {
                continue;
            }
            self.first_disappearance.insert(city.clone(), month);
            update.disappeared.push(city.clone());
        }

        if !update.is_quiet() {
            debug!(
                "{}: {} cities appeared, {} disappeared",
                month,
                update.appeared.len(),
                update.disappeared.len()
            );
        }

        self.months.insert(month, summary);
        self.last_month = Some(month);
        Ok(update)
    }

    pub fn months(&self) -> &BTreeMap<MonthKey, MonthlySummary> {
        &self.months
    }

    pub fn month(&self, month: MonthKey) -> Option<&MonthlySummary> {
        self.months.get(&month)
    }

    pub fn first_appearance(&self) -> &BTreeMap<CityId, Appearance> {
        &self.first_appearance
    }

    pub fn first_disappearance(&self) -> &BTreeMap<CityId, MonthKey> {
        &self.first_disappearance
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
