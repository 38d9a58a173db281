use super::{AppliedStep, Ledger, LedgerError};
use crate::store::{SqlValue, Store};
use crate::utils::{is_valid_identifier, DEFAULT_LEDGER_TABLE};
use async_trait::async_trait;

/// Ledger kept in a table inside the store it describes.
///
/// Rows are read back in insertion order (`rowid`), which is the order the
/// steps were applied in.
#[derive(Debug, Clone)]
pub struct TableLedger {
    table: String,
}

impl TableLedger {
    /// Create a ledger backed by the given table.
    pub fn new(table: impl Into<String>) -> Result<Self, LedgerError> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(LedgerError::InvalidTableName(table));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Default for TableLedger {
    fn default() -> Self {
        Self {
            table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

#[async_trait]
impl Ledger for TableLedger {
    async fn prepare(&self, store: &mut dyn Store) -> Result<(), LedgerError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                name TEXT PRIMARY KEY NOT NULL, \
                checksum TEXT, \
                applied_at TEXT NOT NULL\
            )",
            self.table
        );
        store.execute_batch(&sql).await?;
        Ok(())
    }

    async fn applied(&self, store: &mut dyn Store) -> Result<Vec<AppliedStep>, LedgerError> {
        // A store that was never prepared has nothing applied.
        if !store.table_exists(&self.table).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT name, checksum, applied_at FROM {} ORDER BY rowid",
            self.table
        );
        let rows = store.query(&sql, &[]).await?;

        rows.into_iter()
            .map(|row| {
                let mut cells = row.into_iter();
                let name = match cells.next() {
                    Some(SqlValue::Text(name)) => name,
                    other => {
                        return Err(LedgerError::Corrupt(format!(
                            "unexpected step name value: {:?}",
                            other
                        )))
                    }
                };
                let checksum = match cells.next() {
                    Some(SqlValue::Text(checksum)) => Some(checksum),
                    _ => None,
                };
                let applied_at = match cells.next() {
                    Some(SqlValue::Text(applied_at)) => applied_at,
                    other => {
                        return Err(LedgerError::Corrupt(format!(
                            "unexpected applied_at value for '{}': {:?}",
                            name, other
                        )))
                    }
                };
                Ok(AppliedStep {
                    name,
                    checksum,
                    applied_at,
                })
            })
            .collect()
    }

    async fn record(&self, store: &mut dyn Store, step: &AppliedStep) -> Result<(), LedgerError> {
        let sql = format!(
            "INSERT INTO {} (name, checksum, applied_at) VALUES (?, ?, ?)",
            self.table
        );
        store
            .execute(
                &sql,
                &[
                    SqlValue::from(step.name.as_str()),
                    SqlValue::from(step.checksum.clone()),
                    SqlValue::from(step.applied_at.as_str()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, store: &mut dyn Store, name: &str) -> Result<(), LedgerError> {
        if !store.table_exists(&self.table).await? {
            return Ok(());
        }
        let sql = format!("DELETE FROM {} WHERE name = ?", self.table);
        store.execute(&sql, &[SqlValue::from(name)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    #[test]
    fn test_rejects_invalid_table_name() {
        let result = TableLedger::new("ledger; DROP TABLE users");
        assert!(matches!(result, Err(LedgerError::InvalidTableName(_))));
        assert_eq!(TableLedger::default().table(), "_migrations");
    }

    #[tokio::test]
    async fn test_unprepared_store_has_nothing_applied() {
        let mut store = SqliteStore::open_in_memory().await.unwrap();
        let ledger = TableLedger::default();

        assert!(ledger.applied(&mut store).await.unwrap().is_empty());
        ledger.remove(&mut store, "anything").await.unwrap();
    }

    #[tokio::test]
    async fn test_records_in_insertion_order() {
        let mut store = SqliteStore::open_in_memory().await.unwrap();
        let ledger = TableLedger::new("schema_history").unwrap();
        ledger.prepare(&mut store).await.unwrap();
        ledger.prepare(&mut store).await.unwrap();

        // Names deliberately not in lexical order
        for name in ["0002_b", "0001_a", "0003_c"] {
            ledger
                .record(&mut store, &AppliedStep::now(name, Some("abc".to_string())))
                .await
                .unwrap();
        }

        let applied = ledger.applied(&mut store).await.unwrap();
        let names: Vec<_> = applied.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["0002_b", "0001_a", "0003_c"]);
        assert_eq!(applied[0].checksum.as_deref(), Some("abc"));

        ledger.remove(&mut store, "0001_a").await.unwrap();
        let applied = ledger.applied(&mut store).await.unwrap();
        assert_eq!(applied.len(), 2);
    }

    #[tokio::test]
    async fn test_record_without_checksum() {
        let mut store = SqliteStore::open_in_memory().await.unwrap();
        let ledger = TableLedger::default();
        ledger.prepare(&mut store).await.unwrap();

        ledger
            .record(&mut store, &AppliedStep::now("custom", None))
            .await
            .unwrap();

        let applied = ledger.applied(&mut store).await.unwrap();
        assert_eq!(applied[0].checksum, None);
    }
}
