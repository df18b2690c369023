//! `MigrationRecord` - entries in the `bloodbank_migrations` state table

use crate::executor::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A migration recorded in `bloodbank_migrations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,

    /// Human-readable migration name
    pub name: String,

    /// `SHA-256` checksum of the migration script
    pub checksum: String,

    pub applied_at: DateTime<Utc>,

    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,

    pub success: bool,
}

impl MigrationRecord {
    /// Expected column order: `version`, `name`, `checksum`, `applied_at`,
    /// `execution_time_ms`, `success`
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, StoreError> {
        Ok(Self {
            version: row.try_get(0)?,
            name: row.try_get(1)?,
            checksum: row.try_get(2)?,
            applied_at: row.try_get(3)?,
            execution_time_ms: row.try_get(4)?,
            success: row.try_get(5)?,
        })
    }
}
