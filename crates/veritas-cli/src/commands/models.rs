//! `veritas models` command implementation

use super::report_to_anyhow;
use crate::output;
use serde_json::json;
use veritas_foundation::bootstrap::{load_veritas_config, registry_from_configs};
use veritas_foundation::registry::ModelRegistry;
use veritas_kernel::ModelTarget;

/// Execute the `veritas models` command
pub async fn run(config: &str, json: bool, health: bool) -> anyhow::Result<()> {
    let config = load_veritas_config(config).map_err(report_to_anyhow)?;
    let registry = registry_from_configs(&config.models).map_err(report_to_anyhow)?;
    let rows = registry.list();

    let probes = if health {
        let mut probes = Vec::with_capacity(rows.len());
        for row in &rows {
            probes.push(probe(&registry, &row.model_id).await);
        }
        Some(probes)
    } else {
        None
    };

    if json {
        let body: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                json!({
                    "model_id": row.model_id,
                    "provider": row.provider,
                    "capabilities": row.capabilities
                        .iter()
                        .map(|(tag, score)| json!({ "tag": tag, "score": score }))
                        .collect::<Vec<_>>(),
                    "max_concurrent": row.max_concurrent,
                    "default": row.default,
                    "health": probes.as_ref().and_then(|p| p.get(i)),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else if rows.is_empty() {
        println!("No models configured.");
    } else {
        println!("{}", output::models_table(&rows, probes.as_deref()));
    }
    Ok(())
}

async fn probe(registry: &ModelRegistry, model_id: &str) -> String {
    let resolved = match registry.resolve(&ModelTarget::Model(model_id.to_string())) {
        Ok(resolved) => resolved,
        Err(err) => return format!("error: {err}"),
    };
    match resolved.adapter.health_check().await {
        Ok(true) => "ok".to_string(),
        Ok(false) => "down".to_string(),
        Err(err) => format!("error: {err}"),
    }
}
