use super::{AppliedStep, Ledger, LedgerError};
use crate::store::Store;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Ledger held in process memory.
///
/// Its contents live exactly as long as the value, so it should be created
/// alongside the store it describes and dropped with it.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<AppliedStep>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the recorded steps, in order.
    pub async fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn applied(&self, _store: &mut dyn Store) -> Result<Vec<AppliedStep>, LedgerError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn record(&self, _store: &mut dyn Store, step: &AppliedStep) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|entry| entry.name == step.name) {
            return Err(LedgerError::Corrupt(format!(
                "step '{}' is already recorded",
                step.name
            )));
        }
        entries.push(step.clone());
        Ok(())
    }

    async fn remove(&self, _store: &mut dyn Store, name: &str) -> Result<(), LedgerError> {
        self.entries.lock().await.retain(|entry| entry.name != name);
        Ok(())
    }
}
