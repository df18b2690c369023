//! Migration status reporting

use super::lock::is_migration_lock_held;
use super::normalize::legacy_tables;
use super::record::MigrationRecord;
use super::schema::{schema_checksum, table_exists, LIVE};
use super::startup::BASELINE_VERSION;
use super::state_table::{applied_migrations, STATE_TABLE};
use super::MigrationError;
use crate::executor::SqlExecutor;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Applied migrations (from the state table)
    pub applied: Vec<MigrationRecord>,

    /// Tables still carrying a legacy `blood_type` column
    pub legacy_tables: Vec<String>,

    /// Whether the normalized tables exist
    pub schema_present: bool,

    /// Whether another process holds the migration lock
    pub lock_held: bool,

    /// Whether the recorded baseline checksum differs from the DDL this build
    /// would generate
    pub baseline_drifted: bool,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.schema_present && self.legacy_tables.is_empty()
    }

    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }
}

/// Inspect the database without changing it.
pub fn migration_status(executor: &dyn SqlExecutor) -> Result<MigrationStatus, MigrationError> {
    let legacy = legacy_tables(executor)?;
    let tracked = table_exists(executor, STATE_TABLE)?;
    let applied = if tracked {
        applied_migrations(executor)?
    } else {
        Vec::new()
    };
    let lock_held = tracked && is_migration_lock_held(executor)?;
    let current = schema_checksum(&LIVE);
    let baseline_drifted = applied
        .iter()
        .any(|m| m.version == BASELINE_VERSION && m.checksum != current);

    Ok(MigrationStatus {
        schema_present: legacy.is_empty() && table_exists(executor, LIVE.donors)?,
        legacy_tables: legacy.into_iter().map(str::to_string).collect(),
        applied,
        lock_held,
        baseline_drifted,
    })
}
