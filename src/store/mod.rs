//! SQLite storage for specification limits and computed metrics.
//!
//! A [`MetricsStore`] owns one connection for the duration of a pipeline
//! run and closes it when dropped. Table names are validated once when the
//! store is configured; every value goes through bound parameters.

use crate::models::{Metric, SkuScalarMap, SpecLimit, SpecLimitMap, StoredMetrics};
use rusqlite::{params, Connection};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the metrics store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create database directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid table name '{0}': use letters, digits and '_' (max 64 chars, not starting with a digit)")]
    InvalidTableName(String),

    #[error("database error")]
    Sqlite(#[from] rusqlite::Error),
}

/// A validated SQL table identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    const MAX_LEN: usize = 64;

    pub fn parse(name: &str) -> Result<Self, StoreError> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid_start && valid_rest && name.len() <= Self::MAX_LEN {
            Ok(Self(name.to_string()))
        } else {
            Err(StoreError::InvalidTableName(name.to_string()))
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Round to the two fractional digits the table keeps. Non-finite values map to NULL.
pub fn to_column_value(value: f64) -> Option<f64> {
    let rounded = (value * 100.0).round() / 100.0;
    rounded.is_finite().then_some(rounded)
}

/// Connection to the metrics database, scoped to one run.
pub struct MetricsStore {
    conn: Connection,
    table: TableName,
}

impl MetricsStore {
    /// Open (or create) the database file.
    pub fn open(path: &Path, table: TableName) -> Result<Self, StoreError> {
        debug!("Opening metrics database: {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self { conn, table })
    }

    /// Open a private in-memory database.
    #[cfg(test)]
    pub fn open_in_memory(table: TableName) -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            table,
        })
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Create the metrics table if it does not exist.
    pub fn ensure_table(&self) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sku TEXT UNIQUE NOT NULL,
                lsl REAL DEFAULT NULL,
                usl REAL DEFAULT NULL,
                mean REAL DEFAULT NULL,
                variance REAL DEFAULT NULL,
                std_dev REAL DEFAULT NULL,
                sigma_level REAL DEFAULT NULL
            )",
            self.table
        );
        self.conn.execute_batch(&sql)?;
        debug!("Table '{}' ready", self.table);
        Ok(())
    }

    /// Drop the metrics table, discarding stored limits and metrics.
    pub fn drop_table(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", self.table))?;
        debug!("Table '{}' dropped", self.table);
        Ok(())
    }

    /// Insert default specification limits, leaving existing SKUs untouched.
    ///
    /// Returns the number of SKUs inserted.
    pub fn seed_limits(&mut self, limits: &[SpecLimit]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} (sku, lsl, usl) VALUES (?1, ?2, ?3)",
                self.table
            ))?;
            for limit in limits {
                inserted += stmt.execute(params![limit.sku, limit.lsl, limit.usl])?;
            }
        }
        tx.commit()?;

        if inserted > 0 {
            info!("Seeded {} specification limits into '{}'", inserted, self.table);
        }
        Ok(inserted)
    }

    /// Lower specification limits of every SKU that has one.
    pub fn lower_limits(&self) -> Result<SpecLimitMap, StoreError> {
        self.limits("lsl")
    }

    /// Upper specification limits of every SKU that has one.
    pub fn upper_limits(&self) -> Result<SpecLimitMap, StoreError> {
        self.limits("usl")
    }

    fn limits(&self, column: &'static str) -> Result<SpecLimitMap, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT sku, {column} FROM {} WHERE {column} IS NOT NULL",
            self.table
        ))?;

        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
        let map = rows.collect::<Result<SpecLimitMap, _>>()?;
        debug!("Read {} {} values", map.len(), column);
        Ok(map)
    }

    /// Insert or update one metric column for every SKU in `values`.
    ///
    /// Returns the number of rows written.
    pub fn upsert(&mut self, metric: Metric, values: &SkuScalarMap) -> Result<usize, StoreError> {
        let column = metric.column();
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (sku, {column}) VALUES (?1, ?2)
                 ON CONFLICT(sku) DO UPDATE SET {column} = excluded.{column}",
                table = self.table
            ))?;

            let mut entries: Vec<_> = values.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            for (sku, value) in entries {
                written += stmt.execute(params![sku, to_column_value(*value)])?;
            }
        }
        tx.commit()?;

        debug!("Upserted {} {} values into '{}'", written, column, self.table);
        Ok(written)
    }

    /// All rows of the metrics table, in insertion order.
    pub fn rows(&self) -> Result<Vec<StoredMetrics>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, sku, lsl, usl, mean, variance, std_dev, sigma_level FROM {} ORDER BY id",
            self.table
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok(StoredMetrics {
                id: row.get(0)?,
                sku: row.get(1)?,
                lsl: row.get(2)?,
                usl: row.get(3)?,
                mean: row.get(4)?,
                variance: row.get(5)?,
                std_dev: row.get(6)?,
                sigma_level: row.get(7)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl Drop for MetricsStore {
    fn drop(&mut self) {
        debug!("Closing metrics database");
    }
}
