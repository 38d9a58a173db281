//! Ledgers record which migration steps have been applied to a store.
//!
//! The ledger is external to the runner: it is created once per store
//! handle and passed into every run. Two implementations are provided:
//!
//! - [`TableLedger`] keeps the record in a table inside the store itself,
//!   so it is as durable as the data it describes.
//! - [`MemoryLedger`] keeps the record in process memory, for tests and
//!   ephemeral stores.

mod memory;
mod table;

pub use memory::MemoryLedger;
pub use table::TableLedger;

use crate::store::{Store, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid ledger table name: {0}")]
    InvalidTableName(String),

    #[error("Ledger is corrupt: {0}")]
    Corrupt(String),
}

/// One applied step as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedStep {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub applied_at: String,
}

impl AppliedStep {
    /// Create a record stamped with the current time.
    pub fn now(name: impl Into<String>, checksum: Option<String>) -> Self {
        Self {
            name: name.into(),
            checksum,
            applied_at: crate::utils::now_iso(),
        }
    }
}

/// Trait for a persisted record of applied steps.
///
/// Every method receives the store handle the run is operating on, which
/// lets a ledger live inside that store without owning it.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Make the ledger ready for use (for example, create its table).
    async fn prepare(&self, _store: &mut dyn Store) -> Result<(), LedgerError> {
        Ok(())
    }

    /// All applied steps, in the order they were recorded.
    async fn applied(&self, store: &mut dyn Store) -> Result<Vec<AppliedStep>, LedgerError>;

    /// Append a step to the record.
    async fn record(&self, store: &mut dyn Store, step: &AppliedStep) -> Result<(), LedgerError>;

    /// Remove a step from the record. Removing an absent step is not an error.
    async fn remove(&self, store: &mut dyn Store, name: &str) -> Result<(), LedgerError>;
}
