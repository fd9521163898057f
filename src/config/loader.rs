//! Configuration loader
//!
//! Reads `OsConfig` from a YAML file, falling back to defaults when the
//! file does not exist.

use super::OsConfig;
use crate::OsError;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Load configuration from `path`, or defaults if it is absent
pub async fn load_config(path: impl AsRef<Path>) -> Result<OsConfig, OsError> {
    let path = path.as_ref();

    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(OsConfig::default());
    }

    let content = fs::read_to_string(path).await?;
    let config = OsConfig::from_yaml(&content).map_err(|e| {
        OsError::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load configuration from an optional path
pub async fn load_optional(path: Option<&Path>) -> Result<OsConfig, OsError> {
    match path {
        Some(path) => load_config(path).await,
        None => Ok(OsConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("osutil.yaml");

        fs::write(&path, "service_name: custom-init\nboot_poll_interval_ms: 250\n")
            .await
            .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.service_name, "custom-init");
        assert_eq!(config.boot_poll_interval_ms, 250);
        assert_eq!(config.vendor, "Cloudbase Solutions");
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let config = load_config("/nonexistent/osutil.yaml").await.unwrap();
        assert_eq!(config, OsConfig::default());
    }

    #[tokio::test]
    async fn test_malformed_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.yaml");
        fs::write(&path, "vendor: [unterminated").await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, OsError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_optional_none() {
        let config = load_optional(None).await.unwrap();
        assert_eq!(config.product, "Cloudbase-Init");
    }
}
