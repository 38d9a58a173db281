//! Migration system.
//!
//! This module applies ordered, named schema-change steps to a store handle
//! and records them in a ledger.
//!
//! # Overview
//!
//! - Steps are collected in an immutable `StepRegistry`; registration order
//!   is application order
//! - Each step has an `up` and a `down` operation, either SQL scripts or code
//!   implementing `StepOperations`
//! - The `Migrator` applies the steps the ledger does not record yet
//! - When a step's `up` fails, that step's `down` is run and the run halts;
//!   earlier steps stay applied
//!
//! # Usage
//!
//! ```ignore
//! let registry = load_registry(Path::new("migrations")).await?;
//! let ledger = TableLedger::default();
//! let report = Migrator::default().run(&registry, &mut store, &ledger).await?;
//! ```

mod executor;
mod loader;
mod registry;
mod types;

pub use executor::{MigrationRun, Migrator, MigratorOptions};
pub use loader::{load_registry, load_steps};
pub use registry::StepRegistry;
pub use types::{
    MigrationError, MigrationStep, RunOutcome, RunReport, RunState, StepBody, StepFailure,
    StepOperations, StepStatus,
};
