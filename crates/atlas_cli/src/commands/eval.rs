//! `atlas-ext eval`: evaluate a document and print its outputs.

use std::path::Path;
use std::time::Duration;

use atlas_core::{DataSourceRegistry, EvalOptions};
use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use serde_json::Value;
use tracing::{debug, info};

pub async fn run(
    file: &Path,
    vars: Vec<(String, String)>,
    offline: bool,
    timeout: Option<u64>,
) -> Result<()> {
    let source = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| miette::miette!("Failed to read {}: {}", file.display(), e))?;

    let registry = if offline {
        DataSourceRegistry::offline()
    } else {
        DataSourceRegistry::builtin()
    };
    debug!(sources = ?registry.names(), "data sources registered");

    let options = vars
        .into_iter()
        .fold(EvalOptions::default(), |options, (name, value)| options.var(name, value));

    let evaluation = atlas_core::eval::<Value>(&source, &registry, options);
    let evaluation = match timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), evaluation)
            .await
            .map_err(|_| {
                miette::miette!("Evaluation of {} timed out after {}s", file.display(), secs)
            })??,
        None => evaluation.await?,
    };

    let published = evaluation.context.dirs().len();
    if published > 0 {
        info!(published, "directories were published during evaluation");
        eprintln!(
            "{} {} in-memory director{} only live for this evaluation",
            "note:".bright_yellow(),
            published,
            if published == 1 { "y" } else { "ies" }
        );
    }

    let json = serde_json::to_string_pretty(&evaluation.value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
