//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::{Context, Result};

use super::schema::{Lars2AwsConfig, MAX_CHUNK_MB, MIN_CHUNK_MB};

/// Parse lars2aws.toml with detailed error messages
pub fn parse_config_toml(path: &Path) -> Result<Lars2AwsConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse lars2aws.toml content from string
pub fn parse_config_toml_str(content: &str) -> Result<Lars2AwsConfig> {
    let config: Lars2AwsConfig =
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Invalid TOML: {}", e))?;

    validate_config(&config)?;

    Ok(config)
}

pub fn to_toml(config: &Lars2AwsConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config to TOML")
}

/// Reject settings the transfer and inject layers cannot work with.
pub fn validate_config(config: &Lars2AwsConfig) -> Result<()> {
    url::Url::parse(&config.catalog.base_url)
        .with_context(|| format!("catalog.base_url is not a URL: {}", config.catalog.base_url))?;

    if config.storage.bucket.trim().is_empty() {
        anyhow::bail!("storage.bucket must not be empty");
    }
    if config.storage.max_concurrency == 0 {
        anyhow::bail!("storage.max_concurrency must be at least 1");
    }
    if !(MIN_CHUNK_MB..=MAX_CHUNK_MB).contains(&config.storage.multipart_chunk_mb) {
        anyhow::bail!(
            "storage.multipart_chunk_mb must be between {} and {}, got {}",
            MIN_CHUNK_MB,
            MAX_CHUNK_MB,
            config.storage.multipart_chunk_mb
        );
    }
    if !config.storage.root.is_empty() && !config.storage.root.ends_with('/') {
        anyhow::bail!("storage.root must end with '/': {}", config.storage.root);
    }
    if let Some(pattern) = &config.inject.listing_filter {
        regex::Regex::new(pattern)
            .with_context(|| format!("inject.listing_filter is not a valid regex: {}", pattern))?;
    }
    if config.inject.dest_dir.trim().is_empty() {
        anyhow::bail!("inject.dest_dir must not be empty");
    }

    Ok(())
}
