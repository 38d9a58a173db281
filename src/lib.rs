pub mod config;
pub mod instance;
pub mod ledger;
pub mod migration;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::{read_config, write_config, ConfigError, MigrateConfig};
pub use instance::{open_database, open_store, Database, InstanceError, InstanceManager};
pub use ledger::{AppliedStep, Ledger, LedgerError, MemoryLedger, TableLedger};
pub use migration::{
    load_registry, load_steps, MigrationError, MigrationRun, MigrationStep, Migrator,
    MigratorOptions, RunOutcome, RunReport, RunState, StepBody, StepFailure, StepOperations,
    StepRegistry, StepStatus,
};
pub use store::{SqlRow, SqlValue, SqliteStore, Store, StoreError};
