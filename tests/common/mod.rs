#![allow(dead_code)]

use durable_migrate::{MigrationStep, SqliteStore, Store};
use std::path::Path;
use tempfile::TempDir;

/// Create a temporary directory for tests
pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Open a fresh in-memory store
pub async fn memory_store() -> SqliteStore {
    SqliteStore::open_in_memory()
        .await
        .expect("Failed to open in-memory store")
}

/// Step creating the `users` table
pub fn users_step() -> MigrationStep {
    MigrationStep::sql(
        "0001_create_users",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE)",
        "DROP TABLE IF EXISTS users",
    )
}

/// Step creating the `posts` table, which references `users`
pub fn posts_step() -> MigrationStep {
    MigrationStep::sql(
        "0002_create_posts",
        "CREATE TABLE posts (\
            id INTEGER PRIMARY KEY, \
            user_id INTEGER NOT NULL REFERENCES users(id), \
            title TEXT NOT NULL\
        )",
        "DROP TABLE IF EXISTS posts",
    )
}

/// Step that creates a table, then fails on its second statement
pub fn broken_step() -> MigrationStep {
    MigrationStep::sql(
        "0002_broken",
        "CREATE TABLE drafts (id INTEGER PRIMARY KEY); \
         INSERT INTO table_that_does_not_exist (id) VALUES (1);",
        "DROP TABLE IF EXISTS drafts",
    )
}

/// Check a table exists in the store
pub async fn table_exists(store: &mut SqliteStore, table: &str) -> bool {
    store
        .table_exists(table)
        .await
        .expect("Failed to query sqlite_master")
}

/// Write a `<name>.up.sql` / `<name>.down.sql` pair into a directory
pub async fn write_step_files(dir: &Path, name: &str, up: &str, down: &str) {
    tokio::fs::write(dir.join(format!("{}.up.sql", name)), up)
        .await
        .expect("Failed to write up script");
    tokio::fs::write(dir.join(format!("{}.down.sql", name)), down)
        .await
        .expect("Failed to write down script");
}
