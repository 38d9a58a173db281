//! Store handles.
//!
//! A store handle is the object through which migration steps and ledgers
//! execute SQL against one isolated database. Handles are owned by the
//! database instance; the migration runner only ever borrows them.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

/// Error types for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("{0}")]
    Failed(String),
}

/// A single SQL value, used for statement parameters and result cells.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Borrow the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One result row, cells in column order.
pub type SqlRow = Vec<SqlValue>;

/// Trait for an SQL-executing store handle.
///
/// Implementations execute statements one at a time, in call order. Each
/// statement outside an explicit transaction commits on its own, so a
/// multi-statement batch that fails halfway leaves its earlier statements
/// applied.
#[async_trait]
pub trait Store: Send {
    /// Execute one or more `;`-separated statements without parameters.
    ///
    /// Returns the total number of affected rows.
    async fn execute_batch(&mut self, sql: &str) -> Result<u64, StoreError>;

    /// Execute a single statement with positional parameters.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError>;

    /// Run a single query with positional parameters and collect every row.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, StoreError>;

    /// Abandon any transaction a failed statement left open.
    ///
    /// Called before compensating a failed step so the compensation, and
    /// later runs, do not execute inside the abandoned transaction. Must
    /// succeed when no transaction is open.
    async fn reset_transaction(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Check whether a table with the given name exists.
    async fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        let rows = self
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[SqlValue::from(table)],
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
