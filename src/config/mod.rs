mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./streamgate.toml",
        "~/.config/streamgate/config.toml",
        "/etc/streamgate/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.streaming.chunk_size == 0 {
        anyhow::bail!("Streaming chunk_size must be greater than 0");
    }

    if config.streaming.cache_clear_interval_secs == 0 {
        anyhow::bail!("Streaming cache_clear_interval_secs must be greater than 0");
    }

    if config.streaming.fetch_timeout_secs == 0 {
        anyhow::bail!("Streaming fetch_timeout_secs must be greater than 0");
    }

    if config.streaming.auth_max_attempts == 0 {
        anyhow::bail!("Streaming auth_max_attempts must be at least 1");
    }

    if config.identities.is_empty() {
        anyhow::bail!("At least one [[identities]] entry is required");
    }

    let mut names = HashSet::new();
    for identity in &config.identities {
        if identity.name.is_empty() {
            anyhow::bail!("Identity name cannot be empty");
        }
        if !names.insert(identity.name.as_str()) {
            anyhow::bail!("Duplicate identity name '{}'", identity.name);
        }
    }

    let mut ids = HashSet::new();
    for store in &config.stores {
        if !ids.insert(store.id) {
            anyhow::bail!("Duplicate store id {}", store.id);
        }
        if !store.path.exists() {
            tracing::warn!("Store path does not exist: {:?}", store.path);
        }
    }

    Ok(())
}
