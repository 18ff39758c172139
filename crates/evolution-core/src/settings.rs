use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EvolutionError, Result};

/// Default file-name prefix of the monthly dumps.
pub const DEFAULT_REGISTRY_NAME: &str = "peeringdb_2_dump";

/// Accepted `--log-level` / `log_level` values.
pub const LOG_LEVELS: [&str; 4] = ["DEBUG", "INFO", "WARNING", "ERROR"];

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Longitudinal hypergiant footprint statistics from monthly registry dumps
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pdb-evolution",
    about = "Longitudinal hypergiant footprint statistics from monthly registry dumps",
    version
)]
pub struct Settings {
    /// Directory holding the monthly JSON dumps
    #[arg(long, default_value = ".")]
    pub dump_dir: PathBuf,

    /// File-name prefix of the dumps ({name}_{year}_{month}_01.json)
    #[arg(long, default_value = DEFAULT_REGISTRY_NAME)]
    pub registry_name: String,

    /// JSON registry mapping hypergiant keys to {"asns": [...]}
    #[arg(long)]
    pub hypergiants: Option<PathBuf>,

    /// Only track these hypergiant keys (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub focus: Vec<String>,

    /// First year of the window
    #[arg(long, default_value = "2018")]
    pub start_year: i32,

    /// Last year of the window (inclusive)
    #[arg(long, default_value = "2025")]
    pub end_year: i32,

    /// Output JSON path (defaults to ~/.pdb-evolution/final_dicts_{start}_{end}.json)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Also compute per-country content-network statistics
    #[arg(long)]
    pub cdn_evolution: bool,

    /// JSON-lines ASN to country mapping used by the content-network study
    #[arg(long)]
    pub asn_countries: Option<PathBuf>,

    /// JSON file providing defaults for any flag not given on the command line
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

// ── ConfigFile ─────────────────────────────────────────────────────────────────

/// Optional JSON configuration; every field mirrors a CLI flag.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypergiants: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn_evolution: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn_countries: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// Load a config file. Unlike CLI parsing, a broken file is an error:
    /// silently ignoring it would run over the wrong window.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EvolutionError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content)
            .map_err(|e| EvolutionError::Config(format!("{}: {}", path.display(), e)))
    }
}

// ── DriverConfig ───────────────────────────────────────────────────────────────

/// Everything the pipeline driver needs, resolved and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub dump_dir: PathBuf,
    pub registry_name: String,
    pub start_year: i32,
    pub end_year: i32,
    pub cdn_evolution: bool,
}

impl DriverConfig {
    pub fn new(dump_dir: impl Into<PathBuf>, start_year: i32, end_year: i32) -> Result<Self> {
        if start_year > end_year {
            return Err(EvolutionError::Config(format!(
                "start year {} is after end year {}",
                start_year, end_year
            )));
        }
        Ok(Self {
            dump_dir: dump_dir.into(),
            registry_name: DEFAULT_REGISTRY_NAME.to_string(),
            start_year,
            end_year,
            cdn_evolution: false,
        })
    }

    /// Path of the dump for `year`/`month`, whether or not it exists.
    pub fn snapshot_path(&self, year: i32, month: u32) -> PathBuf {
        self.dump_dir.join(format!(
            "{}_{}_{:02}_01.json",
            self.registry_name, year, month
        ))
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse process arguments and merge the `--config` file, if any.
    pub fn load() -> Result<Self> {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Result<Self> {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if let Some(path) = settings.config.clone() {
            let file = ConfigFile::load_from(&path)?;
            settings.merge_config(file, &matches)?;
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        Ok(settings)
    }

    /// Fill every flag that was not explicitly given with the file's value.
    fn merge_config(&mut self, file: ConfigFile, matches: &clap::ArgMatches) -> Result<()> {
        // clap stores arg ids by field name (underscores).
        if !is_arg_explicitly_set(matches, "dump_dir") {
            if let Some(v) = file.dump_dir {
                self.dump_dir = v;
            }
        }
        if !is_arg_explicitly_set(matches, "registry_name") {
            if let Some(v) = file.registry_name {
                self.registry_name = v;
            }
        }
        if !is_arg_explicitly_set(matches, "hypergiants") && self.hypergiants.is_none() {
            self.hypergiants = file.hypergiants;
        }
        if !is_arg_explicitly_set(matches, "focus") {
            if let Some(v) = file.focus {
                self.focus = v;
            }
        }
        if !is_arg_explicitly_set(matches, "start_year") {
            if let Some(v) = file.start_year {
                self.start_year = v;
            }
        }
        if !is_arg_explicitly_set(matches, "end_year") {
            if let Some(v) = file.end_year {
                self.end_year = v;
            }
        }
        if !is_arg_explicitly_set(matches, "output") && self.output.is_none() {
            self.output = file.output;
        }
        if !is_arg_explicitly_set(matches, "cdn_evolution") {
            if let Some(v) = file.cdn_evolution {
                self.cdn_evolution = v;
            }
        }
        if !is_arg_explicitly_set(matches, "asn_countries") && self.asn_countries.is_none() {
            self.asn_countries = file.asn_countries;
        }
        if !is_arg_explicitly_set(matches, "log_level") {
            if let Some(v) = file.log_level {
                let level = v.to_uppercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(EvolutionError::Config(format!(
                        "invalid log_level {:?} (expected one of {})",
                        v,
                        LOG_LEVELS.join(", ")
                    )));
                }
                self.log_level = level;
            }
        }
        Ok(())
    }

    /// Validated driver configuration.
    pub fn driver_config(&self) -> Result<DriverConfig> {
        let mut config = DriverConfig::new(&self.dump_dir, self.start_year, self.end_year)?;
        config.registry_name = self.registry_name.clone();
        config.cdn_evolution = self.cdn_evolution;
        Ok(config)
    }

    /// Path of the hypergiant registry; required for a run.
    pub fn hypergiants_path(&self) -> Result<&Path> {
        self.hypergiants.as_deref().ok_or_else(|| {
            EvolutionError::Config("no hypergiant registry given (--hypergiants)".to_string())
        })
    }

    /// Output path, defaulting to `~/.pdb-evolution/final_dicts_{start}_{end}.json`.
    pub fn output_path(&self) -> PathBuf {
        if let Some(p) = &self.output {
            return p.clone();
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".pdb-evolution").join(format!(
            "final_dicts_{}_{}.json",
            self.start_year, self.end_year
        ))
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
