//! `veritas run` command implementation

use super::report_to_anyhow;
use crate::cli::{FormatArg, RunArgs};
use crate::output;
use colored::Colorize;
use std::time::Duration;
use veritas_foundation::bootstrap::load_pipeline;
use veritas_kernel::{OutputFormat, RequestSource};

/// Execute the `veritas run` command
pub async fn run(config: &str, args: RunArgs) -> anyhow::Result<()> {
    let (_, pipeline) = load_pipeline(config).await.map_err(report_to_anyhow)?;

    let mut request = pipeline
        .request(args.prompt)
        .source(RequestSource::Manual)
        .format(match args.format {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json {
                required_fields: args.required_fields,
            },
            FormatArg::Code => OutputFormat::Code,
        })
        .timeout(Duration::from_secs(args.timeout_secs));
    if let Some(model) = args.model {
        request = request.model(model);
    } else if let Some(tag) = args.capability {
        request = request.capability(tag);
    }
    if let Some(samples) = args.samples {
        request = request.samples(samples);
    }
    if let Some(temperature) = args.temperature {
        request = request.temperature(temperature);
    }

    let result = pipeline.submit(request).await;
    // Flush the configured sinks before printing.
    pipeline.router().shutdown().await;

    match result {
        Ok(outcome) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                output::print_outcome(&outcome);
                output::print_events(&outcome.events);
            }
            Ok(())
        }
        Err(err) => {
            if args.json {
                let body = serde_json::json!({
                    "error": err.error.to_string(),
                    "events": err.events,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                eprintln!("{} {}", "Failed:".red().bold(), err.error);
                output::print_events(&err.events);
            }
            Err(err.into())
        }
    }
}
