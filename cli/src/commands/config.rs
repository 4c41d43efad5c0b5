//! Config command - show and change the stored configuration.

use anyhow::{Context, Result};
use nodessh_core::{Config, ConfigOverrides, ConfigStore};

use crate::ConfigKey;

pub async fn show(overrides: ConfigOverrides, json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let config = store.load().await?.with_overrides(overrides);
    let display = masked(&config);

    if json {
        println!("{}", serde_json::to_string_pretty(&display)?);
        return Ok(());
    }

    println!("Config file: {}", store.config_path().display());
    println!();
    println!("Endpoint:     {}", display.endpoint);
    println!("Token:        {}", display.token.as_deref().unwrap_or("(not set)"));
    println!("Organization: {}", optional(display.organization));
    println!("Cluster:      {}", optional(display.cluster));

    Ok(())
}

pub async fn set(key: ConfigKey, value: &str) -> Result<()> {
    let overrides = overrides_for(key, value)?;
    let store = ConfigStore::new()?;
    store.update(overrides).await?;

    println!("Saved to {}", store.config_path().display());
    Ok(())
}

fn overrides_for(key: ConfigKey, value: &str) -> Result<ConfigOverrides> {
    let mut overrides = ConfigOverrides::default();
    match key {
        ConfigKey::Endpoint => overrides.endpoint = Some(value.to_string()),
        ConfigKey::Token => overrides.token = Some(value.to_string()),
        ConfigKey::Organization => {
            overrides.organization = Some(value.parse().context("organization must be a number")?)
        }
        ConfigKey::Cluster => {
            overrides.cluster = Some(value.parse().context("cluster must be a number")?)
        }
    }
    Ok(overrides)
}

/// Returns a copy of the configuration safe to print.
fn masked(config: &Config) -> Config {
    let mut display = config.clone();
    if display.token.is_some() {
        display.token = Some("********".to_string());
    }
    display
}

fn optional(value: Option<i32>) -> String {
    value.map_or_else(|| "(not set)".to_string(), |v| v.to_string())
}
