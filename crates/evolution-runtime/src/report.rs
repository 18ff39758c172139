//! The output document.
//!
//! Every component is a plain nested mapping (hypergiant → month → value,
//! or hypergiant → city → value for the ledgers) so charting and geocoding
//! tools can read it without knowing how it was computed.

use std::collections::BTreeMap;
use std::path::Path;

use evolution_core::error::Result;
use evolution_core::models::{CityId, MonthKey};
use evolution_core::traffic::Mbps;
use evolution_data::aggregator::{Appearance, HypergiantHistory, MonthlySummary};
use evolution_data::cdn::ContentCountryStats;
use serde::Serialize;

/// hypergiant → month → value.
pub type Series<T> = BTreeMap<String, BTreeMap<MonthKey, T>>;

/// hypergiant → city → value.
pub type Ledger<T> = BTreeMap<String, BTreeMap<CityId, T>>;

/// Facts about the run itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetadata {
    /// RFC 3339 timestamp when the report was assembled.
    pub generated_at: String,
    pub start_year: i32,
    pub end_year: i32,
    pub hypergiants: Vec<String>,
    /// Months whose dump was loaded and joined.
    pub months_processed: Vec<MonthKey>,
    /// Months with no dump on disk.
    pub missing_months: Vec<MonthKey>,
    /// Months whose dump exists but could not be used.
    pub malformed_months: Vec<MonthKey>,
}

/// All cumulative histories and ledgers of a run, keyed by component name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvolutionReport {
    pub capacities: Series<Mbps>,
    pub cities: Series<usize>,
    pub countries: Series<usize>,
    pub fac_count: Series<usize>,
    pub fac: Series<Vec<String>>,
    pub cities_specific: Series<Vec<CityId>>,
    pub countries_specific: Series<Vec<String>>,
    pub first_appearance: Ledger<Appearance>,
    pub ases_in_new_infra: Series<BTreeMap<String, Vec<String>>>,
    pub first_disappearance: Ledger<MonthKey>,
    pub capacities_ixp: Series<BTreeMap<String, Mbps>>,
    pub ixps: Series<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn_per_country: Option<BTreeMap<MonthKey, BTreeMap<String, usize>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn_traffic_per_country: Option<BTreeMap<MonthKey, BTreeMap<String, Mbps>>>,
    pub metadata: RunMetadata,
}

impl EvolutionReport {
    /// Flatten per-hypergiant histories into per-component tables.
    ///
    /// Hypergiants never observed in any month are left out entirely.
    pub fn from_histories(
        histories: &BTreeMap<String, HypergiantHistory>,
        metadata: RunMetadata,
    ) -> Self {
        let mut report = EvolutionReport {
            metadata,
            ..Default::default()
        };

        for (name, history) in histories {
            if history.is_empty() {
                continue;
            }
            let months = history.months();
            report.capacities.insert(name.clone(), project(months, |s| s.capacity));
            report.cities.insert(name.clone(), project(months, |s| s.city_count));
            report
                .countries
                .insert(name.clone(), project(months, |s| s.country_count));
            report.fac_count.insert(name.clone(), project(months, |s| s.fac_count));
            report
                .fac
                .insert(name.clone(), project(months, |s| s.facilities.clone()));
            report
                .cities_specific
                .insert(name.clone(), project(months, |s| s.cities.clone()));
            report
                .countries_specific
                .insert(name.clone(), project(months, |s| s.countries.clone()));
            report.ases_in_new_infra.insert(
                name.clone(),
                project(months, |s| s.asns_per_facility.clone()),
            );
            report.capacities_ixp.insert(
                name.clone(),
                project(months, |s| s.capacities_ixp.clone()),
            );
            report.ixps.insert(name.clone(), project(months, |s| s.ixp_count));
            report
                .first_appearance
                .insert(name.clone(), history.first_appearance().clone());
            report
                .first_disappearance
                .insert(name.clone(), history.first_disappearance().clone());
        }

        report
    }

    /// Attach the per-country content-network tables.
    pub fn with_content(
        mut self,
        content: &BTreeMap<MonthKey, BTreeMap<String, ContentCountryStats>>,
    ) -> Self {
        let per_country: BTreeMap<MonthKey, BTreeMap<String, usize>> = content
            .iter()
            .map(|(month, stats)| {
                let counts = stats
                    .iter()
                    .map(|(country, s)| (country.clone(), s.organizations))
                    .collect();
                (*month, counts)
            })
            .collect();
        let traffic: BTreeMap<MonthKey, BTreeMap<String, Mbps>> = content
            .iter()
            .map(|(month, stats)| {
                let totals = stats
                    .iter()
                    .map(|(country, s)| (country.clone(), s.traffic))
                    .collect();
                (*month, totals)
            })
            .collect();
        self.cdn_per_country = Some(per_country);
        self.cdn_traffic_per_country = Some(traffic);
        self
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Write the report as pretty JSON via a temp file and rename, so readers
    /// never see a partial document.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }
}

fn project<T>(
    months: &BTreeMap<MonthKey, MonthlySummary>,
    f: impl Fn(&MonthlySummary) -> T,
) -> BTreeMap<MonthKey, T> {
    months.iter().map(|(month, summary)| (*month, f(summary))).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
