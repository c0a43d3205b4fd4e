//! flightsurety deploys the FlightSurety contracts and publishes their addresses to the dapp.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};

use cli::{Cli, ENV_PREFIX};
use flightsurety_deploy::{
    PIPELINE_CONF_FILENAME, PipelineConfig, PipelineError, PipelineOutcome, PublishFailure,
    TargetConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = match &cli.config {
        Some(config_path) => {
            let config = load_config(config_path)?;
            tracing::info!(
                config_path = %config_path.display(),
                network = %config.network_name,
                rpc_url = %config.rpc_url,
                "Loading pipeline from config file..."
            );
            config
        }
        None => cli.to_config(),
    };

    if let Some(save_path) = &cli.save_config {
        config.save_to_file(save_path)?;
    }

    let targets = config.targets.clone();
    let outcome = config.run().await.inspect_err(report_inconsistent_targets)?;

    println!("{}", summary_table(&outcome, &targets));

    Ok(())
}

/// Layer the TOML file at `path` (or the default file inside it) with environment overrides.
fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config_path = if path.is_dir() {
        path.join(PIPELINE_CONF_FILENAME)
    } else {
        path.to_path_buf()
    };

    if !config_path.is_file() {
        anyhow::bail!("Configuration file not found: {}", config_path.display());
    }

    Figment::new()
        .merge(Toml::file(&config_path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context(format!("Failed to load config from {}", config_path.display()))
}

/// Targets left disagreeing need a manual fix, so name them loudly.
fn report_inconsistent_targets(err: &anyhow::Error) {
    if let Some(PipelineError::Publish(PublishFailure::Inconsistent {
        committed,
        failures,
    })) = err.downcast_ref::<PipelineError>()
    {
        tracing::error!(
            committed = ?committed,
            failed = ?failures.iter().map(|f| f.target.as_str()).collect::<Vec<_>>(),
            "Publish targets now hold different deployments; rerun the pipeline to repair them"
        );
    }
}

fn summary_table(outcome: &PipelineOutcome, targets: &[TargetConfig]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Target", "Directory", "Files"]);

    for published in &outcome.report.targets {
        let directory = targets
            .iter()
            .find(|t| t.name == published.name)
            .map(|t| t.path.display().to_string())
            .unwrap_or_default();
        table.add_row(vec![
            published.name.clone(),
            directory,
            published.files.join(", "),
        ]);
    }

    table.add_row(vec![
        format!("network {}", outcome.config.network_name()),
        String::new(),
        outcome.config.rpc_endpoint().to_string(),
    ]);
    table.add_row(vec![
        "data contract".to_string(),
        String::new(),
        outcome.config.data_address().to_string(),
    ]);
    table.add_row(vec![
        "app contract".to_string(),
        String::new(),
        outcome.config.app_address().to_string(),
    ]);
    table.add_row(vec![
        "config sha256".to_string(),
        String::new(),
        outcome.report.config_digest.clone(),
    ]);

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_load_config_from_directory() {
        let temp_dir = TempDir::new("flightsurety-test").expect("Failed to create temp dir");
        let mut config = PipelineConfig::default();
        config.network_name = "ganache".to_string();
        config
            .save_to_file(&temp_dir.path().join(PIPELINE_CONF_FILENAME))
            .unwrap();

        let loaded = load_config(temp_dir.path()).unwrap();

        assert_eq!(loaded.network_name, "ganache");
        assert_eq!(loaded.targets, config.targets);
    }

    #[test]
    fn test_load_config_missing_file() {
        let temp_dir = TempDir::new("flightsurety-test").expect("Failed to create temp dir");
        assert!(load_config(&temp_dir.path().join("missing.toml")).is_err());
    }
}
