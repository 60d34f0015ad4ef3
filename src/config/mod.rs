pub mod types;

use std::path::Path;

use crate::error::{Error, Result};
use types::Config;

pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        serde_yml::from_str(&content)?
    } else {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Environment variables override file values so that secrets and endpoints
/// stay out of the config file in deployments.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("OPENAI_API_KEY")
        && !key.is_empty()
    {
        config.provider.api_key = Some(key);
    }
    if let Ok(url) = std::env::var("REDIS_URL")
        && !url.is_empty()
    {
        config.cache.redis_url = Some(url);
    }
    if let Ok(url) = std::env::var("QDRANT_URL")
        && !url.is_empty()
    {
        config.store.qdrant_url = Some(url);
    }
    if let Ok(key) = std::env::var("QDRANT_API_KEY")
        && !key.is_empty()
    {
        config.store.qdrant_api_key = Some(key);
    }
    if let Ok(token) = std::env::var("ADMIN_TOKEN")
        && !token.is_empty()
    {
        config.server.admin_token = Some(token);
    }
    if let Ok(addr) = std::env::var("BIND_ADDR")
        && !addr.is_empty()
    {
        config.server.bind_addr = addr;
    }
}
