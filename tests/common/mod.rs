//! Shared fixtures for integration tests.

#![allow(dead_code)]

use slm_embed::config::EngineSettings;
use slm_embed::models::{ConnectionKey, Upload};
use slm_embed::Engine;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::{Path, PathBuf};

pub const SHOP_SCHEMA: &[&str] = &[
    "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
    "CREATE TABLE products (id INTEGER PRIMARY KEY, title TEXT NOT NULL, price REAL DEFAULT 0)",
    "CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES customers(id),
        product_id INTEGER REFERENCES products(id),
        note TEXT
    )",
    "CREATE VIEW order_summary AS SELECT o.id, c.name FROM orders o JOIN customers c ON c.id = o.customer_id",
    "INSERT INTO customers (id, name, email) VALUES (1, 'Ada', 'ada@example.com'), (2, 'Linus', NULL), (3, 'Grace', 'grace@example.com')",
    "INSERT INTO products (id, title, price) VALUES (1, 'Keyboard', 49.5), (2, 'Mouse', 19.0)",
    "INSERT INTO orders (id, customer_id, product_id, note) VALUES (1, 1, 1, 'gift'), (2, 1, 2, NULL), (3, 2, 2, NULL), (4, 3, 1, 'rush')",
];

/// Create a SQLite file at `path` by running `statements`.
///
/// Rollback journal mode keeps the database self-contained in one file.
pub async fn create_database(path: &Path, statements: &[&str]) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    for statement in statements {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

/// Bytes of a SQLite database built from `statements`, as a client would
/// upload them.
pub async fn database_bytes(statements: &[&str]) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.db");
    create_database(&path, statements).await;
    std::fs::read(&path).unwrap()
}

pub async fn shop_upload() -> Upload {
    Upload::new("shop.db", database_bytes(SHOP_SCHEMA).await)
}

/// A database file on disk and the registry key that addresses it.
pub async fn shop_file(dir: &tempfile::TempDir, name: &str) -> (PathBuf, ConnectionKey) {
    let path = dir.path().join(name);
    create_database(&path, SHOP_SCHEMA).await;
    let key = ConnectionKey::embedded(&path);
    (path, key)
}

/// Engine whose uploads land in `dir`.
pub fn engine_in(dir: &tempfile::TempDir) -> Engine {
    Engine::new(EngineSettings {
        temp_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    })
}

/// Database files left in `dir`.
pub fn leftover_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("upload_"))
        .collect()
}
