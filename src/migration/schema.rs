//! Normalized schema DDL and catalog probes.
//!
//! The five entity tables are described once and built for either the live
//! names or the `*_new` staging names the legacy normalization copies into.

use super::checksum::calculate_checksum;
use crate::executor::{SqlExecutor, StoreError};
use sea_query::{
    ColumnDef, Expr, ForeignKey, Index, PostgresQueryBuilder, Table, TableCreateStatement,
};
use std::collections::HashSet;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub const BLOOD_TYPES: &str = "blood_types";

/// Physical names of the entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSet {
    pub donors: &'static str,
    pub recipients: &'static str,
    pub donations: &'static str,
    pub requests: &'static str,
    pub inventory: &'static str,
}

pub const LIVE: TableSet = TableSet {
    donors: "donors",
    recipients: "recipients",
    donations: "donations",
    requests: "requests",
    inventory: "inventory",
};

pub const STAGING: TableSet = TableSet {
    donors: "donors_new",
    recipients: "recipients_new",
    donations: "donations_new",
    requests: "requests_new",
    inventory: "inventory_new",
};

impl TableSet {
    /// Table names in foreign-key order.
    pub fn all(&self) -> [&'static str; 5] {
        [
            self.donors,
            self.recipients,
            self.donations,
            self.requests,
            self.inventory,
        ]
    }
}

fn id_column() -> ColumnDef {
    ColumnDef::new("id")
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn deleted_at_column() -> ColumnDef {
    ColumnDef::new("deleted_at").timestamp_with_time_zone().null().to_owned()
}

pub fn blood_types_table() -> TableCreateStatement {
    Table::create()
        .table(BLOOD_TYPES)
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("label").text().not_null().unique_key())
        .to_owned()
}

fn person_table(table: &'static str, locality: &'static str) -> TableCreateStatement {
    Table::create()
        .table(table)
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("name").text().not_null())
        .col(ColumnDef::new("blood_type_id").big_integer().not_null())
        .col(ColumnDef::new("phone").text().null())
        .col(ColumnDef::new(locality).text().null())
        .col(
            ColumnDef::new("created_at")
                .date()
                .not_null()
                .default(Expr::current_date()),
        )
        .col(deleted_at_column())
        .foreign_key(
            ForeignKey::create()
                .from(table, "blood_type_id")
                .to(BLOOD_TYPES, "id"),
        )
        .to_owned()
}

fn donations_table(tables: &TableSet) -> TableCreateStatement {
    Table::create()
        .table(tables.donations)
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("donor_id").big_integer().not_null())
        .col(ColumnDef::new("units").integer().not_null())
        .col(
            ColumnDef::new("donation_date")
                .date()
                .not_null()
                .default(Expr::current_date()),
        )
        .col(ColumnDef::new("expiry_date").date().not_null())
        .col(deleted_at_column())
        .foreign_key(
            ForeignKey::create()
                .from(tables.donations, "donor_id")
                .to(tables.donors, "id"),
        )
        .to_owned()
}

fn requests_table(tables: &TableSet) -> TableCreateStatement {
    Table::create()
        .table(tables.requests)
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("recipient_id").big_integer().not_null())
        .col(ColumnDef::new("units").integer().not_null())
        .col(ColumnDef::new("status").text().not_null().default("Pending"))
        .col(
            ColumnDef::new("request_date")
                .date()
                .not_null()
                .default(Expr::current_date()),
        )
        .col(deleted_at_column())
        .foreign_key(
            ForeignKey::create()
                .from(tables.requests, "recipient_id")
                .to(tables.recipients, "id"),
        )
        .to_owned()
}

fn inventory_table(tables: &TableSet) -> TableCreateStatement {
    Table::create()
        .table(tables.inventory)
        .if_not_exists()
        .col(id_column())
        .col(
            ColumnDef::new("blood_type_id")
                .big_integer()
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new("units").integer().not_null().default(0))
        .col(deleted_at_column())
        .foreign_key(
            ForeignKey::create()
                .from(tables.inventory, "blood_type_id")
                .to(BLOOD_TYPES, "id"),
        )
        .to_owned()
}

/// `CREATE TABLE` statements for the entity tables, in foreign-key order.
pub fn entity_tables(tables: &TableSet) -> Vec<TableCreateStatement> {
    vec![
        person_table(tables.donors, "city"),
        person_table(tables.recipients, "hospital"),
        donations_table(tables),
        requests_table(tables),
        inventory_table(tables),
    ]
}

/// Full DDL script for the normalized schema under `tables`.
pub fn schema_script(tables: &TableSet) -> String {
    std::iter::once(blood_types_table())
        .chain(entity_tables(tables))
        .map(|stmt| stmt.build(PostgresQueryBuilder))
        .collect::<Vec<_>>()
        .join(";\n")
}

pub fn schema_checksum(tables: &TableSet) -> String {
    calculate_checksum(&schema_script(tables))
}

pub fn table_exists(executor: &dyn SqlExecutor, table: &str) -> Result<bool, StoreError> {
    let row = executor.query_one(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1)",
        &[&table],
    )?;
    Ok(row.try_get(0)?)
}

/// Column names of `table` in the current schema; empty when it doesn't exist.
pub fn columns_of(executor: &dyn SqlExecutor, table: &str) -> Result<HashSet<String>, StoreError> {
    let rows = executor.query_all(
        "SELECT column_name::text FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1",
        &[&table],
    )?;
    rows.iter()
        .map(|row| row.try_get::<_, String>(0).map_err(StoreError::from))
        .collect()
}

pub fn has_column(executor: &dyn SqlExecutor, table: &str, column: &str) -> Result<bool, StoreError> {
    Ok(columns_of(executor, table)?.contains(column))
}

/// `information_schema` data type of a column, `None` when it doesn't exist.
pub fn column_type(
    executor: &dyn SqlExecutor,
    table: &str,
    column: &str,
) -> Result<Option<String>, StoreError> {
    let row = executor.query_opt(
        "SELECT data_type::text FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2",
        &[&table, &column],
    )?;
    Ok(match row {
        Some(row) => Some(row.try_get(0)?),
        None => None,
    })
}

/// Add `column` to `table` unless it is already there.
pub fn ensure_column(
    executor: &dyn SqlExecutor,
    table: &'static str,
    column: ColumnDef,
) -> Result<(), StoreError> {
    let sql = Table::alter()
        .table(table)
        .add_column_if_not_exists(column)
        .build(PostgresQueryBuilder);
    executor.execute(&sql, &[])?;
    Ok(())
}

/// Create `blood_types`, adopting an older table whose label column was
/// called `type` or whose ids are 32-bit.
pub fn ensure_blood_types(executor: &dyn SqlExecutor) -> Result<(), StoreError> {
    let columns = columns_of(executor, BLOOD_TYPES)?;
    if columns.contains("type") && !columns.contains("label") {
        log::info!("renaming blood_types.type to blood_types.label");
        executor.execute("ALTER TABLE blood_types RENAME COLUMN \"type\" TO label", &[])?;
    }
    if column_type(executor, BLOOD_TYPES, "id")?.as_deref() == Some("integer") {
        log::info!("widening blood_types.id to bigint");
        let widen = Table::alter()
            .table(BLOOD_TYPES)
            .modify_column(ColumnDef::new("id").big_integer())
            .build(PostgresQueryBuilder);
        executor.execute(&widen, &[])?;
    }
    executor.execute(&blood_types_table().build(PostgresQueryBuilder), &[])?;
    Ok(())
}

/// Create whatever part of the normalized schema is missing. Returns `true`
/// when the entity tables had to be created.
pub fn bootstrap(executor: &dyn SqlExecutor) -> Result<bool, StoreError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::migration_span("bootstrap").entered();

    let fresh = !table_exists(executor, LIVE.donors)?;
    ensure_blood_types(executor)?;
    for table in entity_tables(&LIVE) {
        executor.execute(&table.build(PostgresQueryBuilder), &[])?;
    }
    for table in LIVE.all() {
        ensure_column(executor, table, deleted_at_column())?;
    }
    let index = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_inventory_blood_type_id")
        .table(LIVE.inventory)
        .col(Expr::col("blood_type_id"))
        .to_owned();
    executor.execute(&index.build(PostgresQueryBuilder), &[])?;

    if fresh {
        log::info!("created normalized blood bank schema");
    }
    Ok(fresh)
}
