mod bootstrap;

use anyhow::{Context, Result};
use evolution_core::settings::Settings;
use evolution_data::registry::{AsnCountryMap, HypergiantRegistry};
use evolution_runtime::driver::PipelineDriver;

fn main() -> Result<()> {
    let settings = Settings::load()?;

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("pdb-evolution v{} starting", env!("CARGO_PKG_VERSION"));

    let config = settings.driver_config()?;
    let registry_path = settings.hypergiants_path()?;
    let registry = HypergiantRegistry::load(registry_path, &settings.focus)
        .with_context(|| format!("loading hypergiant registry {}", registry_path.display()))?;
    if registry.is_empty() {
        tracing::warn!("No hypergiants selected; the report will be empty");
    }
    tracing::info!(
        "Tracking {} hypergiants from {}",
        registry.len(),
        registry_path.display()
    );

    let mut driver = PipelineDriver::new(config, registry);
    if let Some(path) = &settings.asn_countries {
        let map = AsnCountryMap::load(path)
            .with_context(|| format!("loading ASN country map {}", path.display()))?;
        tracing::info!("Loaded {} ASN country entries", map.len());
        driver = driver.with_asn_countries(map);
    }

    let report = driver.run();

    let output = settings.output_path();
    bootstrap::ensure_output_dir(&output)?;
    report
        .write_to(&output)
        .with_context(|| format!("writing report {}", output.display()))?;

    tracing::info!(
        "Wrote {} ({} hypergiants with data, {} months processed)",
        output.display(),
        report.fac_count.len(),
        report.metadata.months_processed.len()
    );

    Ok(())
}
