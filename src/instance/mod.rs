//! Database instances.
//!
//! Each logical database is identified by an instance identifier and owns
//! exactly one store handle for its whole lifetime. Its migrations run once,
//! lazily, the first time the instance is opened.

use crate::config::MigrateConfig;
use crate::ledger::{Ledger, LedgerError, TableLedger};
use crate::migration::{MigrationError, Migrator, MigratorOptions, RunReport, StepRegistry, StepStatus};
use crate::store::{SqliteStore, StoreError};
use crate::utils::{is_valid_name, DATABASE_EXTENSION};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    #[error("Migration error: {0}")]
    MigrationError(#[from] MigrationError),

    #[error("Invalid instance id: {0}")]
    InvalidInstanceId(String),
}

/// One durable unit: a store handle, its ledger, and the steps it runs.
pub struct Database {
    instance_id: String,
    store: SqliteStore,
    ledger: Box<dyn Ledger>,
    registry: Arc<StepRegistry>,
    migrator: Migrator,
    initialized: Option<RunReport>,
}

impl Database {
    pub fn new(
        instance_id: impl Into<String>,
        store: SqliteStore,
        ledger: Box<dyn Ledger>,
        registry: Arc<StepRegistry>,
        migrator: Migrator,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            store,
            ledger,
            registry,
            migrator,
            initialized: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Bring the schema up to date.
    ///
    /// The first successful call runs the migrator; later calls return the
    /// same report without touching the store. A failed run is returned as
    /// an error and the next call tries again.
    pub async fn initialize(&mut self) -> Result<RunReport, InstanceError> {
        if let Some(report) = &self.initialized {
            return Ok(report.clone());
        }

        info!(instance = %self.instance_id, "Initializing database");

        let report = self
            .migrator
            .run(&self.registry, &mut self.store, self.ledger.as_ref())
            .await?;

        let report = match report.into_result() {
            Ok(report) => report,
            Err(e) => {
                warn!(instance = %self.instance_id, error = %e, "Database initialization failed");
                return Err(e.into());
            }
        };

        self.initialized = Some(report.clone());
        Ok(report)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.is_some()
    }

    /// The store handle, for application queries.
    pub fn store(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    /// Status of every registered step against this database.
    pub async fn status(&mut self) -> Result<Vec<StepStatus>, InstanceError> {
        Ok(self
            .migrator
            .status(&self.registry, &mut self.store, self.ledger.as_ref())
            .await?)
    }

    /// Undo the most recently applied step.
    pub async fn revert_latest(&mut self) -> Result<Option<String>, InstanceError> {
        let reverted = self
            .migrator
            .revert_latest(&self.registry, &mut self.store, self.ledger.as_ref())
            .await?;

        // The schema is no longer at the latest step.
        if reverted.is_some() {
            self.initialized = None;
        }
        Ok(reverted)
    }

    /// Close the store handle.
    pub async fn close(self) -> Result<(), InstanceError> {
        self.store.close().await?;
        Ok(())
    }
}

/// Open the store handle for an instance as configured.
///
/// With a data directory the instance lives in `<data_dir>/<id>.sqlite3`;
/// without one it is a private in-memory database.
pub async fn open_store(config: &MigrateConfig, instance_id: &str) -> Result<SqliteStore, InstanceError> {
    if !is_valid_name(instance_id) {
        return Err(InstanceError::InvalidInstanceId(instance_id.to_string()));
    }

    match &config.data_dir {
        Some(data_dir) => {
            fs::create_dir_all(data_dir).await?;
            let path = data_dir.join(format!("{}.{}", instance_id, DATABASE_EXTENSION));
            Ok(SqliteStore::open(&path).await?)
        }
        None => Ok(SqliteStore::open_in_memory().await?),
    }
}

/// Open a database for an instance without running its migrations.
pub async fn open_database(
    config: &MigrateConfig,
    registry: Arc<StepRegistry>,
    instance_id: &str,
) -> Result<Database, InstanceError> {
    let store = open_store(config, instance_id).await?;
    let ledger = TableLedger::new(config.ledger_table.clone())?;
    let migrator = Migrator::new(MigratorOptions {
        strict_order: config.strict_order,
    });

    Ok(Database::new(instance_id, store, Box::new(ledger), registry, migrator))
}

/// Owner of all open database instances.
///
/// Each instance sits behind its own mutex, so at most one task uses a
/// store handle at a time.
pub struct InstanceManager {
    config: MigrateConfig,
    registry: Arc<StepRegistry>,
    instances: Mutex<HashMap<String, Arc<Mutex<Database>>>>,
}

impl InstanceManager {
    pub fn new(config: MigrateConfig, registry: Arc<StepRegistry>) -> Self {
        Self {
            config,
            registry,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Get an open, migrated instance, opening and migrating it if needed.
    ///
    /// The manager's map is locked only to look up or insert the instance;
    /// migration runs under the instance's own lock, so a slow migration of
    /// one instance does not block opening others.
    pub async fn open(&self, instance_id: &str) -> Result<Arc<Mutex<Database>>, InstanceError> {
        let (database, created) = {
            let mut instances = self.instances.lock().await;
            match instances.get(instance_id) {
                Some(database) => (Arc::clone(database), false),
                None => {
                    let database =
                        open_database(&self.config, Arc::clone(&self.registry), instance_id).await?;
                    let database = Arc::new(Mutex::new(database));
                    instances.insert(instance_id.to_string(), Arc::clone(&database));
                    (database, true)
                }
            }
        };

        let result = database.lock().await.initialize().await;
        if let Err(e) = result {
            // Only forget the entry if a concurrent close + open has not replaced it.
            let mut instances = self.instances.lock().await;
            if instances
                .get(instance_id)
                .is_some_and(|current| Arc::ptr_eq(current, &database))
            {
                instances.remove(instance_id);
            }
            return Err(e);
        }

        if created {
            info!(instance = %instance_id, "Database instance opened");
        }
        Ok(database)
    }

    /// Forget an instance. Returns whether it was open.
    ///
    /// The store handle is released once the last outstanding reference is
    /// dropped.
    pub async fn close(&self, instance_id: &str) -> bool {
        self.instances.lock().await.remove(instance_id).is_some()
    }

    /// Identifiers of the open instances, sorted.
    pub async fn open_instances(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
