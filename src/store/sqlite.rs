use super::{SqlRow, SqlValue, Store, StoreError};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Executor, Row, Sqlite, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// SQLite's message for `ROLLBACK` outside a transaction
const NO_ACTIVE_TRANSACTION: &str = "no transaction is active";

/// Store handle over a single SQLite connection.
///
/// One connection per handle keeps every statement of a run on the same
/// session, which is what in-memory databases require and what the
/// single-owner model of an instance expects anyway.
pub struct SqliteStore {
    conn: SqliteConnection,
    location: String,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let conn = options.connect().await?;

        debug!(path = %path.display(), "Opened SQLite store");

        Ok(Self {
            conn,
            location: path.display().to_string(),
        })
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let conn = options.connect().await?;

        Ok(Self {
            conn,
            location: ":memory:".to_string(),
        })
    }

    /// Where this store lives (a file path or `:memory:`).
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Direct access to the connection for application queries.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Close the underlying connection gracefully.
    pub async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn execute_batch(&mut self, sql: &str) -> Result<u64, StoreError> {
        let result = Executor::execute(&mut self.conn, sql).await?;
        Ok(result.rows_affected())
    }

    async fn reset_transaction(&mut self) -> Result<(), StoreError> {
        match Executor::execute(&mut self.conn, "ROLLBACK").await {
            Ok(_) => {
                debug!(store = %self.location, "Rolled back transaction left open by a failed statement");
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.message().contains(NO_ACTIVE_TRANSACTION) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        let query = bind_params(sqlx::query(sql), params);
        let result = query.execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, StoreError> {
        let query = bind_params(sqlx::query(sql), params);
        let rows = query.fetch_all(&mut self.conn).await?;

        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Blob(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Decode a row using the storage class SQLite reports for each cell.
fn decode_row(row: &SqliteRow) -> Result<SqlRow, sqlx::Error> {
    let mut cells = Vec::with_capacity(row.len());

    for index in 0..row.len() {
        let type_name = {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                cells.push(SqlValue::Null);
                continue;
            }
            raw.type_info().name().to_string()
        };

        let cell = match type_name.as_str() {
            "INTEGER" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
            "REAL" => SqlValue::Real(row.try_get::<f64, _>(index)?),
            "BLOB" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(index)?),
            _ => SqlValue::Text(row.try_get::<String, _>(index)?),
        };
        cells.push(cell);
    }

    Ok(cells)
}
