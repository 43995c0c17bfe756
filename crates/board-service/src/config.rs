//! Configuration for the board service

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Tunables of a [`BoardService`](crate::BoardService)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Maximum number of batches kept per board for server-side undo
    pub history_limit: usize,
    /// zstd level used when freezing versions (1-22)
    pub snapshot_compression_level: i32,
    /// Cap on frozen versions per board, `None` for unlimited
    pub max_versions_per_board: Option<usize>,
    /// Run structural validation after every batch and roll back on findings
    pub validate_after_batch: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            snapshot_compression_level: 3,
            max_versions_per_board: None,
            validate_after_batch: true,
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a JSON configuration. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ServiceError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        log::info!("Loaded board service configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(ServiceError::Config(
                "historyLimit must be at least 1".to_string(),
            ));
        }
        if !(1..=22).contains(&self.snapshot_compression_level) {
            return Err(ServiceError::Config(format!(
                "snapshotCompressionLevel must be within 1..=22, got {}",
                self.snapshot_compression_level
            )));
        }
        if self.max_versions_per_board == Some(0) {
            return Err(ServiceError::Config(
                "maxVersionsPerBoard must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.snapshot_compression_level, 3);
        assert_eq!(config.max_versions_per_board, None);
        assert!(config.validate_after_batch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ServiceConfig::from_json_str(r#"{"maxVersionsPerBoard": 5}"#).unwrap();
        assert_eq!(config.max_versions_per_board, Some(5));
        assert_eq!(config.history_limit, 100);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            ServiceConfig::from_json_str(r#"{"snapshotCompressionLevel": 30}"#),
            Err(ServiceError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_json_str(r#"{"historyLimit": 0}"#),
            Err(ServiceError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_json_str("not json"),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"historyLimit": 7, "validateAfterBatch": false}}"#).unwrap();

        let config = ServiceConfig::from_path(file.path()).unwrap();
        assert_eq!(config.history_limit, 7);
        assert!(!config.validate_after_batch);

        assert!(matches!(
            ServiceConfig::from_path(file.path().with_extension("missing")),
            Err(ServiceError::Io(_))
        ));
    }
}
