//! Build a registry from a directory of SQL scripts.
//!
//! Each step is a pair of files, `<name>.up.sql` and `<name>.down.sql`.
//! A directory listing has no declaration order, so steps are registered in
//! lexical order of their names; prefix them with a sequence number
//! (`0001_create_users`) to control the order.

use super::registry::StepRegistry;
use super::types::{MigrationError, MigrationStep};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";

#[derive(Default)]
struct ScriptPair {
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

/// Load every step found in `dir`.
pub async fn load_steps(dir: &Path) -> Result<Vec<MigrationStep>, MigrationError> {
    let mut pairs: BTreeMap<String, ScriptPair> = BTreeMap::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some(name) = file_name.strip_suffix(UP_SUFFIX) {
            pairs.entry(name.to_string()).or_default().up = Some(entry.path());
        } else if let Some(name) = file_name.strip_suffix(DOWN_SUFFIX) {
            pairs.entry(name.to_string()).or_default().down = Some(entry.path());
        } else {
            debug!(file = %file_name, "Ignoring non-migration file");
        }
    }

    let mut steps = Vec::with_capacity(pairs.len());

    for (name, pair) in pairs {
        let Some(up_path) = pair.up else {
            warn!(step = %name, "Found down script without up script, ignoring");
            continue;
        };
        let down_path = pair
            .down
            .ok_or_else(|| MigrationError::MissingDownScript(name.clone()))?;

        let up = fs::read_to_string(&up_path).await?;
        let down = fs::read_to_string(&down_path).await?;
        steps.push(MigrationStep::sql(name, up, down));
    }

    Ok(steps)
}

/// Load `dir` and build a validated registry from it.
pub async fn load_registry(dir: &Path) -> Result<StepRegistry, MigrationError> {
    StepRegistry::new(load_steps(dir).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loads_pairs_in_name_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("0002_posts.up.sql"), "CREATE TABLE posts (id INTEGER)").await.unwrap();
        fs::write(dir.join("0002_posts.down.sql"), "DROP TABLE IF EXISTS posts").await.unwrap();
        fs::write(dir.join("0001_users.up.sql"), "CREATE TABLE users (id INTEGER)").await.unwrap();
        fs::write(dir.join("0001_users.down.sql"), "DROP TABLE IF EXISTS users").await.unwrap();
        fs::write(dir.join("README.md"), "notes").await.unwrap();

        let registry = load_registry(dir).await.unwrap();
        assert_eq!(registry.names(), vec!["0001_users", "0002_posts"]);
        assert!(registry.get("0001_users").unwrap().checksum().is_some());
    }

    #[tokio::test]
    async fn test_missing_down_script() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("0001_users.up.sql"), "CREATE TABLE users (id INTEGER)").await.unwrap();

        let result = load_registry(dir).await;
        assert!(matches!(
            result,
            Err(MigrationError::MissingDownScript(name)) if name == "0001_users"
        ));
    }

    #[tokio::test]
    async fn test_orphan_down_script_is_ignored() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("0001_users.down.sql"), "DROP TABLE IF EXISTS users").await.unwrap();

        let registry = load_registry(dir).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = load_registry(&temp_dir.path().join("nope")).await;
        assert!(matches!(result, Err(MigrationError::IoError(_))));
    }

    #[tokio::test]
    async fn test_empty_script_is_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("0001_users.up.sql"), "CREATE TABLE users (id INTEGER)").await.unwrap();
        fs::write(dir.join("0001_users.down.sql"), "\n").await.unwrap();

        let result = load_registry(dir).await;
        assert!(matches!(result, Err(MigrationError::InvalidStep(_, _))));
    }
}
