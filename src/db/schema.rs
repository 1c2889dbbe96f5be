//! Schema introspection.
//!
//! Walks catalog metadata (or PRAGMA output for SQLite) over one borrowed
//! connection and folds it into a [`SchemaDescriptor`]. Only base tables are
//! reported; views and system tables are skipped.
//!
//! Per table, foreign keys are read first and folded into a map keyed by the
//! referencing column, so each column picks up its relations in the same pass
//! that builds its descriptor.
//!
//! Any metadata failure aborts the whole call with
//! [`EngineError::DatabaseAccess`]. Nothing is retried.

use crate::db::pool::DbPool;
use crate::error::{EngineError, EngineResult};
use crate::models::{ColumnDescriptor, OutgoingRelation, SchemaDescriptor, TableDescriptor};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub struct SchemaInspector;

impl SchemaInspector {
    /// Build a fresh descriptor of every user table reachable through `pool`.
    pub async fn introspect(pool: &DbPool) -> EngineResult<SchemaDescriptor> {
        let schema = match pool {
            DbPool::Postgres(p) => postgres::introspect(p).await?,
            DbPool::MySql(p) => mysql::introspect(p).await?,
            DbPool::Sqlite(p) => sqlite::introspect(p).await?,
        };

        info!(
            dialect = %pool.dialect(),
            database = %schema.database_identifier,
            tables = schema.tables.len(),
            "Schema introspected"
        );
        Ok(schema)
    }

    /// Name of the database (catalog) the pool is connected to.
    pub async fn database_name(pool: &DbPool) -> EngineResult<String> {
        match pool {
            DbPool::Postgres(p) => {
                let mut conn = p.acquire().await?;
                postgres::database_name(&mut conn).await
            }
            DbPool::MySql(p) => {
                let mut conn = p.acquire().await?;
                mysql::database_name(&mut conn).await
            }
            DbPool::Sqlite(p) => {
                let mut conn = p.acquire().await?;
                sqlite::database_name(&mut conn).await
            }
        }
    }

    /// Number of user tables, as reported by the same listing introspection
    /// uses.
    pub async fn table_count(pool: &DbPool) -> EngineResult<usize> {
        match pool {
            DbPool::Postgres(p) => {
                let mut conn = p.acquire().await?;
                Ok(postgres::list_tables(&mut conn).await?.len())
            }
            DbPool::MySql(p) => {
                let mut conn = p.acquire().await?;
                Ok(mysql::list_tables(&mut conn).await?.len())
            }
            DbPool::Sqlite(p) => {
                let mut conn = p.acquire().await?;
                Ok(sqlite::list_tables(&mut conn).await?.len())
            }
        }
    }
}

fn access(e: sqlx::Error) -> EngineError {
    EngineError::access(e.to_string())
}

/// `TYPE(SIZE)`, the operator-facing column type of server dialects.
fn format_type(type_name: &str, size: i64) -> String {
    format!("{}({})", type_name, size)
}

/// Group `(referencing column, relation)` pairs by column, keeping order.
fn fold_relations(
    rows: impl IntoIterator<Item = (String, OutgoingRelation)>,
) -> HashMap<String, Vec<OutgoingRelation>> {
    let mut relations: HashMap<String, Vec<OutgoingRelation>> = HashMap::new();
    for (column, relation) in rows {
        relations.entry(column).or_default().push(relation);
    }
    relations
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const DATABASE_NAME: &str = "SELECT current_database()::text";

        /// Non-public schemas are reported as `schema.table`.
        pub const LIST_TABLES: &str = r#"
            SELECT table_schema::text AS table_schema, table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema NOT IN ('pg_catalog', 'information_schema')
              AND table_schema NOT LIKE 'pg_toast%'
              AND table_schema NOT LIKE 'pg_temp%'
            ORDER BY table_schema, table_name
            "#;

        pub const PRIMARY_KEYS: &str = r#"
            SELECT a.attname::text AS column_name
            FROM pg_index i
            JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
            WHERE i.indrelid = (quote_ident($1) || '.' || quote_ident($2))::regclass
              AND i.indisprimary
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                src.attname::text AS column_name,
                CASE WHEN tn.nspname = 'public' THEN tc.relname::text
                     ELSE (tn.nspname || '.' || tc.relname)::text
                END AS foreign_table_name,
                dst.attname::text AS foreign_column_name
            FROM pg_constraint c
            CROSS JOIN LATERAL unnest(c.conkey, c.confkey) AS k(src_attnum, dst_attnum)
            JOIN pg_attribute src ON src.attrelid = c.conrelid AND src.attnum = k.src_attnum
            JOIN pg_class tc ON tc.oid = c.confrelid
            JOIN pg_namespace tn ON tn.oid = tc.relnamespace
            JOIN pg_attribute dst ON dst.attrelid = c.confrelid AND dst.attnum = k.dst_attnum
            WHERE c.contype = 'f'
              AND c.conrelid = (quote_ident($1) || '.' || quote_ident($2))::regclass
            ORDER BY c.conname
            "#;

        pub const COLUMNS: &str = r#"
            SELECT
                c.column_name::text AS column_name,
                c.udt_name::text AS type_name,
                CASE
                    -- binary precision for built-in numbers; report decimal digits
                    WHEN c.numeric_precision_radix = 2 THEN
                        CASE c.udt_name
                            WHEN 'int2' THEN 5
                            WHEN 'int4' THEN 10
                            WHEN 'int8' THEN 19
                            WHEN 'float4' THEN 8
                            WHEN 'float8' THEN 17
                            ELSE c.numeric_precision
                        END
                    ELSE COALESCE(c.character_maximum_length, c.numeric_precision, c.datetime_precision, 0)
                END::int8 AS column_size,
                (c.is_nullable = 'YES') AS nullable,
                COALESCE(col_description(a.attrelid, a.attnum), '')::text AS description
            FROM information_schema.columns c
            JOIN pg_attribute a
              ON a.attrelid = (quote_ident(c.table_schema) || '.' || quote_ident(c.table_name))::regclass
             AND a.attname = c.column_name
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
            "#;
    }

    pub mod mysql {
        pub const DATABASE_NAME: &str = "SELECT DATABASE()";

        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8mb4) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const PRIMARY_KEYS: &str = r#"
            SELECT CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
                CONVERT(REFERENCED_TABLE_NAME USING utf8mb4) AS REFERENCED_TABLE_NAME,
                CONVERT(REFERENCED_COLUMN_NAME USING utf8mb4) AS REFERENCED_COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
              AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
            "#;

        pub const COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
                UPPER(CONVERT(DATA_TYPE USING utf8mb4)) AS TYPE_NAME,
                CAST(COALESCE(CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, DATETIME_PRECISION, 0) AS SIGNED) AS COLUMN_SIZE,
                CONVERT(IS_NULLABLE USING utf8mb4) AS IS_NULLABLE,
                CONVERT(COLUMN_COMMENT USING utf8mb4) AS COLUMN_COMMENT
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const DATABASE_FILE: &str =
            "SELECT file FROM pragma_database_list WHERE name = 'main'";

        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT id, seq, "table", "from", "to"
            FROM pragma_foreign_key_list(?)
            ORDER BY id, seq
            "#;

        pub const COLUMNS: &str = r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
            "#;

        pub const PRIMARY_KEY_COLUMNS: &str = r#"
            SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::postgres::PgConnection;
    use sqlx::{PgPool, Row};

    pub struct TableRef {
        pub schema: String,
        pub name: String,
    }

    impl TableRef {
        fn identifier(&self) -> String {
            if self.schema == "public" {
                self.name.clone()
            } else {
                format!("{}.{}", self.schema, self.name)
            }
        }
    }

    pub async fn introspect(pool: &PgPool) -> EngineResult<SchemaDescriptor> {
        let mut conn = pool.acquire().await?;
        let database_identifier = database_name(&mut conn).await?;

        let mut tables = Vec::new();
        for table in list_tables(&mut conn).await? {
            debug!(table = %table.identifier(), "Processing table");
            let relations = fetch_foreign_keys(&mut conn, &table).await?;
            let primary_keys = fetch_primary_keys(&mut conn, &table).await?;
            let columns = fetch_columns(&mut conn, &table, &primary_keys, relations).await?;
            tables.push(TableDescriptor::new(table.identifier(), columns));
        }

        Ok(SchemaDescriptor {
            database_identifier,
            tables,
        })
    }

    pub async fn database_name(conn: &mut PgConnection) -> EngineResult<String> {
        sqlx::query_scalar::<_, String>(queries::postgres::DATABASE_NAME)
            .fetch_one(&mut *conn)
            .await
            .map_err(access)
    }

    pub async fn list_tables(conn: &mut PgConnection) -> EngineResult<Vec<TableRef>> {
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        rows.iter()
            .map(|row| {
                Ok(TableRef {
                    schema: row.try_get("table_schema").map_err(access)?,
                    name: row.try_get("table_name").map_err(access)?,
                })
            })
            .collect()
    }

    async fn fetch_primary_keys(
        conn: &mut PgConnection,
        table: &TableRef,
    ) -> EngineResult<HashSet<String>> {
        sqlx::query_scalar::<_, String>(queries::postgres::PRIMARY_KEYS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&mut *conn)
            .await
            .map(|names| names.into_iter().collect())
            .map_err(access)
    }

    async fn fetch_foreign_keys(
        conn: &mut PgConnection,
        table: &TableRef,
    ) -> EngineResult<HashMap<String, Vec<OutgoingRelation>>> {
        let rows = sqlx::query(queries::postgres::FOREIGN_KEYS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        let pairs = rows
            .iter()
            .map(|row| {
                let column: String = row.try_get("column_name").map_err(access)?;
                let target_table: String = row.try_get("foreign_table_name").map_err(access)?;
                let target_column: String = row.try_get("foreign_column_name").map_err(access)?;
                Ok((column, OutgoingRelation::new(target_table, target_column)))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(fold_relations(pairs))
    }

    async fn fetch_columns(
        conn: &mut PgConnection,
        table: &TableRef,
        primary_keys: &HashSet<String>,
        mut relations: HashMap<String, Vec<OutgoingRelation>>,
    ) -> EngineResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::postgres::COLUMNS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("column_name").map_err(access)?;
                let type_name: String = row.try_get("type_name").map_err(access)?;
                let size: i64 = row.try_get("column_size").map_err(access)?;
                let nullable: bool = row.try_get("nullable").map_err(access)?;
                let description: Option<String> = row.try_get("description").map_err(access)?;

                Ok(ColumnDescriptor::new(&name, format_type(&type_name, size))
                    .with_primary_key(primary_keys.contains(&name))
                    .with_nullable(nullable)
                    .with_description(description)
                    .with_relations(relations.remove(&name).unwrap_or_default()))
            })
            .collect()
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlConnection, MySqlRow};
    use sqlx::{MySqlPool, Row};

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset
    /// configuration, so fall back to raw bytes.
    fn get_string(row: &MySqlRow, column: &str) -> EngineResult<String> {
        get_optional_string(row, column)?
            .ok_or_else(|| EngineError::access(format!("column {} is NULL", column)))
    }

    fn get_optional_string(row: &MySqlRow, column: &str) -> EngineResult<Option<String>> {
        if let Ok(value) = row.try_get::<Option<String>, _>(column) {
            return Ok(value);
        }
        row.try_get::<Option<Vec<u8>>, _>(column)
            .map_err(access)?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| EngineError::access(format!("column {}: {}", column, e)))
            })
            .transpose()
    }

    /// MySQL 5.x returns BIGINT, 8.x may return BIGINT UNSIGNED.
    fn get_size(row: &MySqlRow, column: &str) -> i64 {
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(column) {
            return v;
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
            return i64::try_from(v).unwrap_or(i64::MAX);
        }
        0
    }

    pub async fn introspect(pool: &MySqlPool) -> EngineResult<SchemaDescriptor> {
        let mut conn = pool.acquire().await?;
        let database_identifier = database_name(&mut conn).await?;

        let mut tables = Vec::new();
        for table in list_tables(&mut conn).await? {
            debug!(table = %table, "Processing table");
            let relations = fetch_foreign_keys(&mut conn, &table).await?;
            let primary_keys = fetch_primary_keys(&mut conn, &table).await?;
            let columns = fetch_columns(&mut conn, &table, &primary_keys, relations).await?;
            tables.push(TableDescriptor::new(table, columns));
        }

        Ok(SchemaDescriptor {
            database_identifier,
            tables,
        })
    }

    pub async fn database_name(conn: &mut MySqlConnection) -> EngineResult<String> {
        let row = sqlx::query(queries::mysql::DATABASE_NAME)
            .fetch_one(&mut *conn)
            .await
            .map_err(access)?;

        // DATABASE() is NULL when no default schema is selected
        if let Ok(value) = row.try_get::<Option<String>, _>(0) {
            return Ok(value.unwrap_or_default());
        }
        let bytes = row.try_get::<Option<Vec<u8>>, _>(0).map_err(access)?;
        Ok(bytes
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default())
    }

    pub async fn list_tables(conn: &mut MySqlConnection) -> EngineResult<Vec<String>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        rows.iter().map(|row| get_string(row, "TABLE_NAME")).collect()
    }

    async fn fetch_primary_keys(
        conn: &mut MySqlConnection,
        table: &str,
    ) -> EngineResult<HashSet<String>> {
        let rows = sqlx::query(queries::mysql::PRIMARY_KEYS)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        rows.iter().map(|row| get_string(row, "COLUMN_NAME")).collect()
    }

    async fn fetch_foreign_keys(
        conn: &mut MySqlConnection,
        table: &str,
    ) -> EngineResult<HashMap<String, Vec<OutgoingRelation>>> {
        let rows = sqlx::query(queries::mysql::FOREIGN_KEYS)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        let pairs = rows
            .iter()
            .map(|row| {
                let column = get_string(row, "COLUMN_NAME")?;
                let target_table = get_string(row, "REFERENCED_TABLE_NAME")?;
                let target_column = get_string(row, "REFERENCED_COLUMN_NAME")?;
                Ok((column, OutgoingRelation::new(target_table, target_column)))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(fold_relations(pairs))
    }

    async fn fetch_columns(
        conn: &mut MySqlConnection,
        table: &str,
        primary_keys: &HashSet<String>,
        mut relations: HashMap<String, Vec<OutgoingRelation>>,
    ) -> EngineResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::mysql::COLUMNS)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        rows.iter()
            .map(|row| {
                let name = get_string(row, "COLUMN_NAME")?;
                let type_name = get_string(row, "TYPE_NAME")?;
                let size = get_size(row, "COLUMN_SIZE");
                let nullable = get_string(row, "IS_NULLABLE")? == "YES";
                let comment = get_optional_string(row, "COLUMN_COMMENT")?;

                Ok(ColumnDescriptor::new(&name, format_type(&type_name, size))
                    .with_primary_key(primary_keys.contains(&name))
                    .with_nullable(nullable)
                    .with_description(comment)
                    .with_relations(relations.remove(&name).unwrap_or_default()))
            })
            .collect()
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteConnection;
    use sqlx::{Row, SqlitePool};
    use std::path::Path;

    pub async fn introspect(pool: &SqlitePool) -> EngineResult<SchemaDescriptor> {
        let mut conn = pool.acquire().await?;
        let database_identifier = database_name(&mut conn).await?;

        let mut tables = Vec::new();
        for table in list_tables(&mut conn).await? {
            debug!(table = %table, "Processing table");
            let relations = fetch_foreign_keys(&mut conn, &table).await?;
            let columns = fetch_columns(&mut conn, &table, relations).await?;
            tables.push(TableDescriptor::new(table, columns));
        }

        Ok(SchemaDescriptor {
            database_identifier,
            tables,
        })
    }

    /// File name of the main database, or `main` for in-memory databases.
    pub async fn database_name(conn: &mut SqliteConnection) -> EngineResult<String> {
        let file = sqlx::query_scalar::<_, Option<String>>(queries::sqlite::DATABASE_FILE)
            .fetch_optional(&mut *conn)
            .await
            .map_err(access)?
            .flatten();

        Ok(file
            .as_deref()
            .filter(|f| !f.is_empty())
            .and_then(|f| Path::new(f).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string()))
    }

    pub async fn list_tables(conn: &mut SqliteConnection) -> EngineResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(queries::sqlite::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)
    }

    async fn primary_key_columns(
        conn: &mut SqliteConnection,
        table: &str,
    ) -> EngineResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(queries::sqlite::PRIMARY_KEY_COLUMNS)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)
    }

    async fn fetch_foreign_keys(
        conn: &mut SqliteConnection,
        table: &str,
    ) -> EngineResult<HashMap<String, Vec<OutgoingRelation>>> {
        let rows = sqlx::query(queries::sqlite::FOREIGN_KEYS)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        let mut pairs = Vec::with_capacity(rows.len());
        // target table -> its primary key columns, for implicit references
        let mut target_keys: HashMap<String, Vec<String>> = HashMap::new();

        for row in &rows {
            let seq: i64 = row.try_get("seq").map_err(access)?;
            let target_table: String = row.try_get("table").map_err(access)?;
            let column: String = row.try_get("from").map_err(access)?;
            let explicit: Option<String> = row.try_get("to").map_err(access)?;

            // `REFERENCES parent` without a column list points at the
            // parent's primary key
            let target_column = match explicit {
                Some(to) => to,
                None => {
                    if !target_keys.contains_key(&target_table) {
                        let keys = primary_key_columns(conn, &target_table).await?;
                        target_keys.insert(target_table.clone(), keys);
                    }
                    target_keys
                        .get(&target_table)
                        .and_then(|keys| usize::try_from(seq).ok().and_then(|i| keys.get(i)))
                        .cloned()
                        .unwrap_or_default()
                }
            };

            pairs.push((column, OutgoingRelation::new(target_table, target_column)));
        }

        Ok(fold_relations(pairs))
    }

    async fn fetch_columns(
        conn: &mut SqliteConnection,
        table: &str,
        mut relations: HashMap<String, Vec<OutgoingRelation>>,
    ) -> EngineResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::sqlite::COLUMNS)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(access)?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name").map_err(access)?;
                let declared_type: String = row.try_get("type").map_err(access)?;
                let notnull: i64 = row.try_get("notnull").map_err(access)?;
                let default_value: Option<String> = row.try_get("dflt_value").map_err(access)?;
                let pk: i64 = row.try_get("pk").map_err(access)?;

                // The pragma has no comment field; the default value stands in
                // as the description.
                Ok(ColumnDescriptor::new(&name, declared_type)
                    .with_primary_key(pk > 0)
                    .with_nullable(notnull == 0)
                    .with_description(default_value)
                    .with_relations(relations.remove(&name).unwrap_or_default()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_type() {
        assert_eq!(format_type("varchar", 255), "varchar(255)");
        assert_eq!(format_type("INT", 10), "INT(10)");
        assert_eq!(format_type("text", 0), "text(0)");
    }

    #[test]
    fn test_fold_relations_groups_by_column() {
        let folded = fold_relations(vec![
            ("customer_id".to_string(), OutgoingRelation::new("customers", "id")),
            ("product_id".to_string(), OutgoingRelation::new("products", "id")),
            ("customer_id".to_string(), OutgoingRelation::new("legacy_customers", "id")),
        ]);

        assert_eq!(folded.len(), 2);
        let customer = &folded["customer_id"];
        assert_eq!(customer.len(), 2);
        assert_eq!(customer[0].target_table, "customers");
        assert_eq!(customer[1].target_table, "legacy_customers");
        assert_eq!(folded["product_id"].len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_introspection_in_memory() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE parent (id INTEGER PRIMARY KEY, label TEXT NOT NULL DEFAULT 'none')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent)")
            .execute(&pool)
            .await
            .unwrap();
        let pool = DbPool::Sqlite(pool);

        let schema = SchemaInspector::introspect(&pool).await.unwrap();
        assert_eq!(schema.database_identifier, "main");
        assert_eq!(schema.tables.len(), 2);

        let parent = schema.table("parent").unwrap();
        let label = parent.column("label").unwrap();
        assert_eq!(label.column_type, "TEXT");
        assert_eq!(label.description, "'none'");
        assert!(!label.nullable);
        assert!(parent.column("id").unwrap().is_primary_key);

        // implicit reference resolves to the parent's primary key
        let child = schema.table("child").unwrap();
        let relations = &child.column("parent_id").unwrap().relations;
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].target_table, "parent");
        assert_eq!(relations[0].target_column, "id");

        assert_eq!(SchemaInspector::table_count(&pool).await.unwrap(), 2);
    }
}
