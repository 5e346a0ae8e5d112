//! Construction of a ready-to-run pipeline from a configuration file.
//!
//! ```rust,ignore
//! let (config, pipeline) = veritas_foundation::bootstrap::load_pipeline("veritas.yaml").await?;
//! let outcome = pipeline.submit(pipeline.request("summarize X")).await?;
//! ```

use crate::backends::create_backend;
use crate::config::{BackendConfig, VeritasConfig};
use crate::feedback::sinks::{JsonlTraceSink, TracingAuditSink};
use crate::feedback::{EventFilter, FeedbackHandler, FeedbackRouter};
use crate::pipeline::InferencePipeline;
use crate::registry::{ModelRegistry, RegisterMode};
use error_stack::ResultExt;
use std::sync::Arc;
use tracing::info;
use veritas_kernel::config::load_with_env;
use veritas_kernel::{BackendAdapter, IntoVeritasReport, VeritasError, VeritasResult};

/// Environment override prefix: `VERITAS_AGENT__MAX_ATTEMPTS=5`.
pub const ENV_PREFIX: &str = "VERITAS";

/// Load, env-override and validate a configuration file.
pub fn load_veritas_config(path: &str) -> VeritasResult<VeritasConfig> {
    let config: VeritasConfig = load_with_env(path, ENV_PREFIX)
        .into_report()
        .attach(format!("loading configuration from {path}"))?;
    config
        .validate()
        .into_report()
        .attach(format!("validating configuration from {path}"))?;
    Ok(config)
}

fn adapters(
    models: &[BackendConfig],
) -> VeritasResult<Vec<(Arc<dyn BackendAdapter>, BackendConfig)>> {
    models
        .iter()
        .map(|model| {
            let adapter = create_backend(model)
                .into_report()
                .attach(format!("creating backend for model '{}'", model.model_id))?;
            Ok((adapter, model.clone()))
        })
        .collect()
}

/// Registry holding one registration per configured model.
pub fn registry_from_configs(models: &[BackendConfig]) -> VeritasResult<ModelRegistry> {
    let registry = ModelRegistry::new();
    for (adapter, config) in adapters(models)? {
        let model_id = config.model_id.clone();
        registry
            .register(adapter, config, RegisterMode::Insert)
            .into_report()
            .attach(format!("registering model '{model_id}'"))?;
    }
    Ok(registry)
}

/// Explicit hot reload: swap the registry's contents for `models`.
pub fn reload_registry(registry: &ModelRegistry, models: &[BackendConfig]) -> VeritasResult<()> {
    registry
        .reload(adapters(models)?)
        .into_report()
        .attach("reloading model registry")
}

fn subscribe_sink(router: &FeedbackRouter, sink: Arc<dyn FeedbackHandler>) -> VeritasResult<()> {
    router
        .subscribe(EventFilter::all(), sink)
        .map_err(|e| VeritasError::Internal(e.to_string()))
        .into_report()
        .attach("subscribing feedback sink")?;
    Ok(())
}

/// Wire registry, agent, controllers and feedback sinks from `config`.
pub async fn build_pipeline(config: &VeritasConfig) -> VeritasResult<InferencePipeline> {
    let registry = Arc::new(registry_from_configs(&config.models)?);
    let router = FeedbackRouter::new(config.feedback.subscriber_capacity);

    if config.feedback.audit_log {
        subscribe_sink(&router, Arc::new(TracingAuditSink))?;
    }
    if let Some(path) = &config.feedback.trace_path {
        let sink = JsonlTraceSink::open(path)
            .await
            .into_report()
            .attach(format!("opening feedback trace file {path}"))?;
        subscribe_sink(&router, Arc::new(sink))?;
    }

    let pipeline = InferencePipeline::builder(registry)
        .config(config)
        .router(router)
        .build()
        .into_report()
        .attach("building inference pipeline")?;

    info!(
        models = pipeline.registry().len(),
        default_model = pipeline.registry().default_model().as_deref().unwrap_or("-"),
        "Pipeline ready"
    );
    Ok(pipeline)
}

/// [`load_veritas_config`] followed by [`build_pipeline`].
pub async fn load_pipeline(path: &str) -> VeritasResult<(VeritasConfig, InferencePipeline)> {
    let config = load_veritas_config(path)?;
    let pipeline = build_pipeline(&config).await?;
    Ok((config, pipeline))
}
