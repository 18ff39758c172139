//! Pipeline driver.
//!
//! Walks the year/month grid in order, loads each dump once, and feeds every
//! registered hypergiant's rows into its [`HypergiantHistory`]. All state is
//! owned by the driver and its [`RunState`]; nothing is process-wide.

use std::collections::BTreeMap;

use evolution_core::models::MonthKey;
use evolution_core::settings::DriverConfig;
use evolution_data::aggregator::HypergiantHistory;
use evolution_data::cdn::{summarize_content_networks, ContentCountryStats};
use evolution_data::filter::select_rows;
use evolution_data::reader::{discover_snapshots, load_snapshot, Snapshot};
use evolution_data::registry::{AsnCountryMap, HypergiantRegistry};

use crate::report::{EvolutionReport, RunMetadata};

/// Mutable accumulators for one run.
#[derive(Debug, Default)]
pub struct RunState {
    pub histories: BTreeMap<String, HypergiantHistory>,
    pub content: BTreeMap<MonthKey, BTreeMap<String, ContentCountryStats>>,
    pub processed: Vec<MonthKey>,
    pub missing: Vec<MonthKey>,
    pub malformed: Vec<MonthKey>,
}

pub struct PipelineDriver {
    config: DriverConfig,
    registry: HypergiantRegistry,
    asn_countries: Option<AsnCountryMap>,
}

impl PipelineDriver {
    pub fn new(config: DriverConfig, registry: HypergiantRegistry) -> Self {
        Self {
            config,
            registry,
            asn_countries: None,
        }
    }

    /// Use `map` to place content networks by ASN in the CDN study.
    pub fn with_asn_countries(mut self, map: AsnCountryMap) -> Self {
        self.asn_countries = Some(map);
        self
    }

    /// Process every month of the configured window and build the report.
    ///
    /// A month without a dump is skipped for every hypergiant. A month whose
    /// dump cannot be read or reconstructed is skipped too and listed in the
    /// report metadata; neither aborts the run.
    pub fn run(&self) -> EvolutionReport {
        let available = discover_snapshots(&self.config.dump_dir, &self.config.registry_name);
        tracing::info!(
            "Processing {}..={} for {} hypergiants ({} dumps on disk)",
            self.config.start_year,
            self.config.end_year,
            self.registry.len(),
            available.len()
        );

        let mut state = RunState::default();
        for month in MonthKey::range(self.config.start_year, self.config.end_year) {
            match load_snapshot(&self.config, month) {
                Ok(snapshot) => {
                    self.process_snapshot(&snapshot, &mut state);
                    state.processed.push(month);
                }
                Err(e) if e.is_month_not_found() => {
                    tracing::debug!("{}: no dump, skipping", month);
                    state.missing.push(month);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "{}: unusable dump, skipping", month);
                    state.malformed.push(month);
                }
            }
        }

        tracing::info!(
            "Done: {} months processed, {} missing, {} malformed",
            state.processed.len(),
            state.missing.len(),
            state.malformed.len()
        );

        self.build_report(state)
    }

    /// Fold one month into every hypergiant's history.
    pub fn process_snapshot(&self, snapshot: &Snapshot, state: &mut RunState) {
        for key in self.registry.iter() {
            let rows = select_rows(&snapshot.rows, key);
            if rows.is_empty() {
                continue;
            }

            let history = state.histories.entry(key.name.clone()).or_default();
            match history.apply(snapshot.month, &rows) {
                Ok(update) if !update.is_quiet() => {
                    tracing::debug!(
                        hypergiant = %key.name,
                        appeared = update.appeared.len(),
                        disappeared = update.disappeared.len(),
                        "{}: footprint changed",
                        snapshot.month
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(hypergiant = %key.name, error = %e, "month rejected");
                }
            }
        }

        if self.config.cdn_evolution {
            let stats =
                summarize_content_networks(&snapshot.relations, self.asn_countries.as_ref());
            state.content.insert(snapshot.month, stats);
        }
    }

    fn build_report(&self, state: RunState) -> EvolutionReport {
        let metadata = RunMetadata {
            generated_at: chrono::Utc::now().to_rfc3339(),
            start_year: self.config.start_year,
            end_year: self.config.end_year,
            hypergiants: self.registry.names(),
            months_processed: state.processed,
            missing_months: state.missing,
            malformed_months: state.malformed,
        };

        let report = EvolutionReport::from_histories(&state.histories, metadata);
        if self.config.cdn_evolution {
            report.with_content(&state.content)
        } else {
            report
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use evolution_data::registry::HypergiantKey;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    // ── helpers ───────────────────────────────────────────────────────────

    fn dump(asn: u64, facility: &str, city: &str, country: &str) -> Value {
        json!({
            "org": {"data": [
                {"id": 1, "name": "Example Org", "city": city, "country": country}
            ]},
            "net": {"data": [
                {"id": 100, "org_id": 1, "asn": asn, "name": "Example",
                 "info_type": "Content", "info_traffic": "1-5Tbps"}
            ]},
            "netfac": {"data": [
                {"id": 1000, "net_id": 100, "fac_id": 10, "local_asn": asn,
                 "city": city, "country": country}
            ]},
            "netixlan": {"data": [
                {"id": 5000, "net_id": 100, "name": "IX1",
                 "ipaddr4": "10.0.0.1", "speed": 10000}
            ]},
            "fac": {"data": [
                {"id": 10, "name": facility, "city": city, "country": country}
            ]}
        })
    }

    fn write_dump(config: &DriverConfig, year: i32, month: u32, body: &str) {
        std::fs::write(config.snapshot_path(year, month), body).unwrap();
    }

    fn setup(dir: &TempDir) -> (DriverConfig, HypergiantRegistry) {
        let config = DriverConfig::new(dir.path(), 2023, 2023).unwrap();
        let registry: HypergiantRegistry = [HypergiantKey::new("example", ["64500"])]
            .into_iter()
            .collect();
        (config, registry)
    }

    fn month(year: i32, m: u32) -> MonthKey {
        MonthKey::new(year, m).unwrap()
    }

    // ── end to end ────────────────────────────────────────────────────────

    #[test]
    fn test_two_months_with_gap() {
        let dir = TempDir::new().unwrap();
        let (config, registry) = setup(&dir);
        write_dump(&config, 2023, 1, &dump(64500, "A", "X", "US").to_string());
        write_dump(&config, 2023, 3, &dump(64500, "B", "Y", "DE").to_string());

        let report = PipelineDriver::new(config, registry).run();
        let value = report.to_json().unwrap();

        assert_eq!(
            value["fac_count"]["example"],
            json!({"2023_01": 1, "2023_03": 1})
        );
        assert_eq!(
            value["first_appearance"]["example"],
            json!({"X-US": ["A", "2023_01"], "Y-DE": ["B", "2023_03"]})
        );
        assert_eq!(
            value["first_disappearance"]["example"],
            json!({"X-US": "2023_03"})
        );
        assert_eq!(report.metadata.months_processed, vec![month(2023, 1), month(2023, 3)]);
        assert_eq!(report.metadata.missing_months.len(), 10);
        assert!(report.metadata.missing_months.contains(&month(2023, 2)));
        assert!(report.metadata.malformed_months.is_empty());
    }

    #[test]
    fn test_malformed_month_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (config, registry) = setup(&dir);
        write_dump(&config, 2023, 1, &dump(64500, "A", "X", "US").to_string());
        write_dump(&config, 2023, 2, "{not json");
        let mut no_fac = dump(64500, "A", "X", "US");
        no_fac.as_object_mut().unwrap().remove("fac");
        write_dump(&config, 2023, 3, &no_fac.to_string());

        let report = PipelineDriver::new(config, registry).run();
        assert_eq!(report.metadata.malformed_months, vec![month(2023, 2), month(2023, 3)]);
        assert_eq!(report.metadata.months_processed, vec![month(2023, 1)]);
        assert_eq!(report.fac_count["example"].len(), 1);
        assert!(report.first_disappearance["example"].is_empty());
    }

    #[test]
    fn test_hypergiant_without_rows_is_absent() {
        let dir = TempDir::new().unwrap();
        let (config, _) = setup(&dir);
        write_dump(&config, 2023, 1, &dump(64500, "A", "X", "US").to_string());
        let registry: HypergiantRegistry = [
            HypergiantKey::new("example", ["64500"]),
            HypergiantKey::new("ghost", ["64511"]),
        ]
        .into_iter()
        .collect();

        let report = PipelineDriver::new(config, registry).run();
        assert!(report.fac_count.contains_key("example"));
        assert!(!report.fac_count.contains_key("ghost"));
        assert_eq!(report.metadata.hypergiants, vec!["example", "ghost"]);
    }

    #[test]
    fn test_empty_dump_dir_yields_empty_report() {
        let dir = TempDir::new().unwrap();
        let (config, registry) = setup(&dir);
        let report = PipelineDriver::new(config, registry).run();
        assert!(report.fac_count.is_empty());
        assert_eq!(report.metadata.missing_months.len(), 12);
        assert!(report.cdn_per_country.is_none());
    }

    // ── content networks ──────────────────────────────────────────────────

    #[test]
    fn test_cdn_tables_when_enabled() {
        let dir = TempDir::new().unwrap();
        let (mut config, registry) = setup(&dir);
        config.cdn_evolution = true;
        write_dump(&config, 2023, 1, &dump(64500, "A", "X", "US").to_string());

        let map: AsnCountryMap = [("64500", "NL")].into_iter().collect();
        let report = PipelineDriver::new(config, registry)
            .with_asn_countries(map)
            .run();
        let value = report.to_json().unwrap();
        assert_eq!(value["cdn_per_country"], json!({"2023_01": {"NL": 1}}));
        assert_eq!(
            value["cdn_traffic_per_country"],
            json!({"2023_01": {"NL": 5000000}})
        );
    }

    #[test]
    fn test_process_snapshot_shares_one_load_across_hypergiants() {
        let dir = TempDir::new().unwrap();
        let (config, _) = setup(&dir);
        let registry: HypergiantRegistry = [
            HypergiantKey::new("first", ["64500"]),
            HypergiantKey::new("second", ["64500"]),
        ]
        .into_iter()
        .collect();
        write_dump(&config, 2023, 1, &dump(64500, "A", "X", "US").to_string());
        let snapshot = load_snapshot(&config, month(2023, 1)).unwrap();

        let driver = PipelineDriver::new(config, registry);
        let mut state = RunState::default();
        driver.process_snapshot(&snapshot, &mut state);

        assert_eq!(state.histories.len(), 2);
        assert!(state.content.is_empty());
        for history in state.histories.values() {
            assert_eq!(history.months().len(), 1);
        }
    }
}
