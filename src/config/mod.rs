use crate::utils::DEFAULT_LEDGER_TABLE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_ledger_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

/// Migration runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateConfig {
    /// Directory holding `<name>.up.sql` / `<name>.down.sql` pairs
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    /// Directory holding one database file per instance.
    /// Instances are kept in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Name of the ledger table inside each database
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,
    /// Refuse to apply a pending step registered before an applied one
    #[serde(default)]
    pub strict_order: bool,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            migrations_dir: default_migrations_dir(),
            data_dir: None,
            ledger_table: default_ledger_table(),
            strict_order: false,
        }
    }
}

/// Read the configuration file
pub async fn read_config(config_path: &Path) -> Result<Option<MigrateConfig>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(config_path).await?;
    let config: MigrateConfig = serde_json::from_str(&content)?;
    Ok(Some(config))
}

/// Write the configuration file
pub async fn write_config(config_path: &Path, config: &MigrateConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content).await?;
    Ok(())
}
