//! Migration state table management

use super::record::MigrationRecord;
use crate::executor::{SqlExecutor, StoreError};
use sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, PostgresQueryBuilder, Table, TableCreateStatement};

pub const STATE_TABLE: &str = "bloodbank_migrations";

/// `bloodbank_migrations` holds one row per applied migration plus the lock
/// row (see [`super::lock`]).
pub fn create_state_table() -> TableCreateStatement {
    Table::create()
        .table(STATE_TABLE)
        .if_not_exists()
        .col(ColumnDef::new("version").big_integer().not_null().primary_key())
        .col(ColumnDef::new("name").string_len(255).not_null())
        .col(ColumnDef::new("checksum").string_len(64).not_null())
        .col(ColumnDef::new("applied_at").timestamp_with_time_zone().not_null())
        .col(ColumnDef::new("execution_time_ms").big_integer().null())
        .col(ColumnDef::new("success").boolean().not_null().default(false))
        .to_owned()
}

pub fn create_state_table_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx_bloodbank_migrations_applied_at")
        .table(STATE_TABLE)
        .col(Expr::col("applied_at"))
        .to_owned()
}

/// Create the state table and its index if they don't exist.
pub fn initialize_state_table(executor: &dyn SqlExecutor) -> Result<(), StoreError> {
    executor.execute(&create_state_table().build(PostgresQueryBuilder), &[])?;
    executor.execute(&create_state_table_index().build(PostgresQueryBuilder), &[])?;
    Ok(())
}

/// Record a successful migration. Re-recording a version is a no-op.
pub fn record_applied(
    executor: &dyn SqlExecutor,
    version: i64,
    name: &str,
    checksum: &str,
    execution_time_ms: i64,
) -> Result<bool, StoreError> {
    let inserted = executor.execute(
        "INSERT INTO bloodbank_migrations (version, name, checksum, applied_at, execution_time_ms, success) \
         VALUES ($1, $2, $3, NOW(), $4, true) \
         ON CONFLICT (version) DO NOTHING",
        &[&version, &name, &checksum, &execution_time_ms],
    )?;
    Ok(inserted == 1)
}

/// Applied migrations in version order, excluding the lock row.
pub fn applied_migrations(executor: &dyn SqlExecutor) -> Result<Vec<MigrationRecord>, StoreError> {
    let rows = executor.query_all(
        "SELECT version, name, checksum, applied_at, execution_time_ms, success \
         FROM bloodbank_migrations WHERE version > 0 ORDER BY version",
        &[],
    )?;
    rows.iter().map(MigrationRecord::from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_table_ddl() {
        let sql = create_state_table().build(PostgresQueryBuilder);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"bloodbank_migrations\""));
        assert!(sql.contains("\"version\""));
        assert!(sql.contains("\"checksum\""));
        assert!(sql.contains("\"execution_time_ms\""));
    }

    #[test]
    fn test_state_table_index_ddl() {
        let sql = create_state_table_index().build(PostgresQueryBuilder);
        assert!(sql.contains("idx_bloodbank_migrations_applied_at"));
        assert!(sql.contains("\"bloodbank_migrations\""));
    }
}
