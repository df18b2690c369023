//! Rewrite legacy `blood_type` text columns into `blood_type_id` references.
//!
//! The whole rewrite runs on the caller's transaction. PostgreSQL DDL is
//! transactional, so an interrupted run leaves the legacy tables as they were
//! and a rerun starts over; leftover `*_new` tables from a run that died
//! outside a transaction are dropped first.

use super::schema::{self, TableSet, BLOOD_TYPES, LIVE, STAGING};
use super::MigrationError;
use crate::executor::SqlExecutor;
use crate::model::UNKNOWN_LABEL;
use chrono::NaiveDate;
use sea_query::{ColumnDef, PostgresQueryBuilder, Table};
use std::collections::HashSet;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub const NORMALIZE_VERSION: i64 = 20240301000000;
pub const NORMALIZE_NAME: &str = "normalize_blood_types";

/// Tables that may still carry the denormalized `blood_type` column.
const LEGACY_SOURCES: [&str; 3] = ["donors", "recipients", "inventory"];

/// Legacy text columns that hold dates.
const DATE_COLUMNS: [&str; 5] = [
    "created_at",
    "deleted_at",
    "donation_date",
    "expiry_date",
    "request_date",
];

/// Session-local lookup from raw legacy date text to the parsed date.
const LEGACY_DATES: &str = "pg_temp.legacy_dates";

/// Legacy tables in the current schema that still have a `blood_type` column.
pub fn legacy_tables(executor: &dyn SqlExecutor) -> Result<Vec<&'static str>, MigrationError> {
    let mut found = Vec::new();
    for table in LEGACY_SOURCES {
        if schema::has_column(executor, table, "blood_type")? {
            found.push(table);
        }
    }
    Ok(found)
}

/// Normalize a legacy schema in place. Returns `false` when there is nothing
/// to do.
pub fn normalize_legacy(executor: &dyn SqlExecutor) -> Result<bool, MigrationError> {
    let legacy = legacy_tables(executor)?;
    if legacy.is_empty() {
        log::debug!("no legacy blood_type columns found");
        return Ok(false);
    }

    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::migration_span(NORMALIZE_NAME).entered();
    log::info!("normalizing legacy blood_type columns in {legacy:?}");

    for staged in STAGING.all() {
        let drop = Table::drop()
            .table(staged)
            .if_exists()
            .cascade()
            .build(PostgresQueryBuilder);
        executor.execute(&drop, &[])?;
    }

    let mut present = Vec::new();
    for table in LIVE.all() {
        if schema::table_exists(executor, table)? {
            schema::ensure_column(executor, table, ColumnDef::new("deleted_at").text().null().to_owned())?;
            present.push(table);
        }
    }

    schema::ensure_blood_types(executor)?;
    for table in &legacy {
        let added = executor.execute(
            &format!(
                "INSERT INTO {BLOOD_TYPES} (label) \
                 SELECT DISTINCT UPPER(TRIM(blood_type::text)) FROM {table} \
                 WHERE blood_type IS NOT NULL AND TRIM(blood_type::text) <> '' \
                 ON CONFLICT (label) DO NOTHING"
            ),
            &[],
        )?;
        log::info!("registered {added} blood type label(s) from {table}");
    }
    executor.execute(
        &format!("INSERT INTO {BLOOD_TYPES} (label) VALUES ($1) ON CONFLICT (label) DO NOTHING"),
        &[&UNKNOWN_LABEL],
    )?;

    for table in schema::entity_tables(&STAGING) {
        executor.execute(&table.build(PostgresQueryBuilder), &[])?;
    }

    stage_legacy_dates(executor, &present)?;
    for table in &present {
        let columns = schema::columns_of(executor, table)?;
        if let Some(parent) = Parent::of(table) {
            if columns.contains(parent.column) {
                let adopted = executor.execute(&parent.placeholder_statement(table), &[])?;
                if adopted > 0 {
                    log::warn!(
                        "{table} references {adopted} missing {}(s); kept as deleted placeholders",
                        parent.noun
                    );
                }
            }
        }
        let sql = copy_statement(table, &columns)?;
        let copied = executor.execute(&sql, &[])?;
        log::info!("copied {copied} row(s) from legacy {table}");
    }
    executor.execute(&format!("DROP TABLE IF EXISTS {LEGACY_DATES}"), &[])?;

    for table in &present {
        let drop = Table::drop()
            .table(*table)
            .cascade()
            .build(PostgresQueryBuilder);
        executor.execute(&drop, &[])?;
    }
    for (staged, live) in STAGING.all().into_iter().zip(LIVE.all()) {
        let rename = Table::rename().table(staged, live).build(PostgresQueryBuilder);
        executor.execute(&rename, &[])?;
        executor.execute(&realign_sequence(live), &[])?;
    }

    log::info!("legacy schema normalized");
    Ok(true)
}

/// DDL script the normalization checksum is taken over.
pub fn normalize_script() -> String {
    schema::schema_script(&STAGING)
}

/// Parse every distinct legacy date once and store the results in
/// [`LEGACY_DATES`]. Values that are not a real calendar date map to NULL, so
/// the copy falls back to its default instead of failing.
fn stage_legacy_dates(executor: &dyn SqlExecutor, present: &[&str]) -> Result<(), MigrationError> {
    executor.execute(&format!("DROP TABLE IF EXISTS {LEGACY_DATES}"), &[])?;
    executor.execute(
        &format!("CREATE TABLE {LEGACY_DATES} (raw TEXT PRIMARY KEY, parsed DATE)"),
        &[],
    )?;
    let insert =
        format!("INSERT INTO {LEGACY_DATES} (raw, parsed) VALUES ($1, $2) ON CONFLICT (raw) DO NOTHING");

    let mut unparsed = 0usize;
    for table in present {
        let columns = schema::columns_of(executor, table)?;
        for column in DATE_COLUMNS.iter().filter(|c| columns.contains(**c)) {
            let rows = executor.query_all(
                &format!("SELECT DISTINCT TRIM({column}::text) FROM {table} WHERE {column} IS NOT NULL"),
                &[],
            )?;
            for row in rows {
                let raw: String = row.try_get(0)?;
                let parsed = parse_legacy_date(&raw);
                if parsed.is_none() && !raw.is_empty() {
                    log::debug!("{table}.{column}: {raw:?} is not a date");
                    unparsed += 1;
                }
                executor.execute(&insert, &[&raw, &parsed])?;
            }
        }
    }
    if unparsed > 0 {
        log::warn!("{unparsed} legacy date value(s) could not be parsed and take their defaults");
    }
    Ok(())
}

/// Date in the leading `YYYY-MM-DD` of a legacy value.
fn parse_legacy_date(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.trim().get(..10)?;
    let bytes = prefix.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Parent table a legacy child row must point at.
struct Parent {
    column: &'static str,
    staged: &'static str,
    noun: &'static str,
}

impl Parent {
    fn of(table: &str) -> Option<Self> {
        match table {
            "donations" => Some(Self {
                column: "donor_id",
                staged: STAGING.donors,
                noun: "donor",
            }),
            "requests" => Some(Self {
                column: "recipient_id",
                staged: STAGING.recipients,
                noun: "recipient",
            }),
            _ => None,
        }
    }

    /// Insert a deleted `UNKNOWN` parent for every id `table` references
    /// that the staged parents lack, keeping the referenced id.
    fn placeholder_statement(&self, table: &str) -> String {
        let (column, staged, noun) = (self.column, self.staged, self.noun);
        format!(
            "INSERT INTO {staged} (id, name, blood_type_id, created_at, deleted_at) \
             SELECT DISTINCT src.{column}, 'Unknown {noun}', \
             (SELECT id FROM {BLOOD_TYPES} WHERE label = '{UNKNOWN_LABEL}'), CURRENT_DATE, NOW() \
             FROM {table} src \
             WHERE src.{column} IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM {staged} p WHERE p.id = src.{column})"
        )
    }
}

fn realign_sequence(table: &str) -> String {
    format!(
        "SELECT setval(pg_get_serial_sequence('{table}', 'id'), \
         COALESCE((SELECT MAX(id) FROM {table}), 0) + 1, false)"
    )
}

/// `INSERT ... SELECT` that copies one legacy table into its staging twin,
/// keeping ids. Columns the legacy table lacks get defaults.
fn copy_statement(table: &str, columns: &HashSet<String>) -> Result<String, MigrationError> {
    let source = Source { table, columns };
    let staged = staged_name(&STAGING, table);
    let deleted_at = source.deleted_at();

    let sql = match table {
        "donors" | "recipients" => {
            let locality = if table == "donors" { "city" } else { "hospital" };
            format!(
                "INSERT INTO {staged} (id, name, blood_type_id, phone, {locality}, created_at, deleted_at) \
                 SELECT src.id, COALESCE({name}, ''), {blood_type}, {phone}, {place}, \
                 COALESCE({created}, CURRENT_DATE), {deleted_at} \
                 FROM {table} src",
                name = source.text("name"),
                blood_type = source.blood_type(),
                phone = source.text("phone"),
                place = source.text(locality),
                created = source.date("created_at"),
            )
        }
        "donations" => {
            source.require("donor_id")?;
            let donated = source.date("donation_date");
            format!(
                "INSERT INTO {staged} (id, donor_id, units, donation_date, expiry_date, deleted_at) \
                 SELECT src.id, src.donor_id, {units}, COALESCE({donated}, CURRENT_DATE), \
                 COALESCE({expiry}, {donated}, CURRENT_DATE), {deleted_at} \
                 FROM {table} src",
                units = source.int("units"),
                expiry = source.date("expiry_date"),
            )
        }
        "requests" => {
            source.require("recipient_id")?;
            format!(
                "INSERT INTO {staged} (id, recipient_id, units, status, request_date, deleted_at) \
                 SELECT src.id, src.recipient_id, {units}, {status}, \
                 COALESCE({requested}, CURRENT_DATE), {deleted_at} \
                 FROM {table} src",
                units = source.int("units"),
                status = source.status(),
                requested = source.date("request_date"),
            )
        }
        "inventory" => {
            // Labels that only differ in case or spacing collapse into one row.
            format!(
                "INSERT INTO {staged} (id, blood_type_id, units, deleted_at) \
                 SELECT MIN(s.id), s.blood_type_id, \
                 COALESCE(SUM(s.units) FILTER (WHERE s.deleted_at IS NULL), SUM(s.units))::INTEGER, \
                 CASE WHEN BOOL_AND(s.deleted_at IS NOT NULL) THEN MAX(s.deleted_at) END \
                 FROM (SELECT src.id, {blood_type} AS blood_type_id, {units} AS units, \
                 {deleted_at} AS deleted_at FROM {table} src) s \
                 GROUP BY s.blood_type_id",
                blood_type = source.blood_type(),
                units = source.int("units"),
            )
        }
        other => {
            return Err(MigrationError::ExecutionFailed {
                version: NORMALIZE_VERSION,
                name: NORMALIZE_NAME.to_string(),
                error: format!("no copy rule for table {other}"),
            })
        }
    };
    Ok(sql)
}

fn staged_name(staging: &TableSet, live: &str) -> &'static str {
    match live {
        "donors" => staging.donors,
        "recipients" => staging.recipients,
        "donations" => staging.donations,
        "requests" => staging.requests,
        _ => staging.inventory,
    }
}

/// Column expressions over a legacy table aliased `src`.
struct Source<'a> {
    table: &'a str,
    columns: &'a HashSet<String>,
}

impl Source<'_> {
    fn has(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    fn require(&self, column: &str) -> Result<(), MigrationError> {
        if self.has(column) {
            Ok(())
        } else {
            Err(MigrationError::ExecutionFailed {
                version: NORMALIZE_VERSION,
                name: NORMALIZE_NAME.to_string(),
                error: format!("legacy table {} has no {column} column", self.table),
            })
        }
    }

    fn text(&self, column: &str) -> String {
        if self.has(column) {
            format!("NULLIF(TRIM(src.{column}::text), '')")
        } else {
            "NULL".to_string()
        }
    }

    fn int(&self, column: &str) -> String {
        if self.has(column) {
            format!("COALESCE(src.{column}, 0)")
        } else {
            "0".to_string()
        }
    }

    /// Parsed date of the value, NULL when absent or unparseable.
    fn date(&self, column: &str) -> String {
        if self.has(column) {
            format!(
                "(SELECT ld.parsed FROM {LEGACY_DATES} ld WHERE ld.raw = TRIM(src.{column}::text))"
            )
        } else {
            "NULL::date".to_string()
        }
    }

    /// Any non-blank legacy marker counts as deleted; unparseable ones are
    /// stamped with the migration time.
    fn deleted_at(&self) -> String {
        if self.has("deleted_at") {
            format!(
                "(CASE WHEN NULLIF(TRIM(src.deleted_at::text), '') IS NULL THEN NULL \
                 ELSE COALESCE({date}::timestamptz, NOW()) END)",
                date = self.date("deleted_at")
            )
        } else {
            "NULL::timestamptz".to_string()
        }
    }

    fn blood_type(&self) -> String {
        let unknown = format!("(SELECT id FROM {BLOOD_TYPES} WHERE label = '{UNKNOWN_LABEL}')");
        if self.has("blood_type") {
            format!(
                "COALESCE((SELECT bt.id FROM {BLOOD_TYPES} bt \
                 WHERE bt.label = UPPER(TRIM(src.blood_type::text))), {unknown})"
            )
        } else if self.has("blood_type_id") {
            format!(
                "COALESCE((SELECT bt.id FROM {BLOOD_TYPES} bt WHERE bt.id = src.blood_type_id), {unknown})"
            )
        } else {
            unknown
        }
    }

    fn status(&self) -> String {
        if self.has("status") {
            "(CASE LOWER(TRIM(src.status::text)) \
             WHEN 'fulfilled' THEN 'Fulfilled' \
             WHEN 'cancelled' THEN 'Cancelled' \
             WHEN 'canceled' THEN 'Cancelled' \
             ELSE 'Pending' END)"
                .to_string()
        } else {
            "'Pending'".to_string()
        }
    }
}
