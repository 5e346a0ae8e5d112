//! `veritas check` command implementation

use super::report_to_anyhow;
use colored::Colorize;
use veritas_foundation::bootstrap::{load_veritas_config, registry_from_configs};

/// Execute the `veritas check` command
pub fn run(config_path: &str) -> anyhow::Result<()> {
    let config = load_veritas_config(config_path).map_err(report_to_anyhow)?;
    // Adapter construction catches provider settings the schema check cannot.
    let registry = registry_from_configs(&config.models).map_err(report_to_anyhow)?;

    println!("{} {}", "✓".green(), config_path);
    println!(
        "  models: {}  default: {}",
        registry.len(),
        registry.default_model().as_deref().unwrap_or("-")
    );
    println!(
        "  samples: {}  quorum: {:.2}  threshold: {:.2}  max iterations: {}",
        config.consistency.default_samples,
        config.consistency.quorum,
        config.scorer.threshold,
        config.refiner.max_iterations
    );
    Ok(())
}
