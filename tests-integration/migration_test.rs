//! Integration tests for the startup migration
//!
//! Covers a fresh bootstrap, normalization of a legacy schema whose tables
//! carry free-text `blood_type` columns, idempotence of a second run, rerunning
//! over leftovers of an interrupted run and the rollback of a migration that
//! cannot complete.
//!
//! Note: These tests require a running PostgreSQL database. Set TEST_DATABASE_URL
//! or they print a skip notice and return.

use bloodbank::migration::startup::BASELINE_VERSION;
use bloodbank::migration::normalize::NORMALIZE_VERSION;
use bloodbank::test_helpers::TestDatabase;
use bloodbank::{BloodBank, DonorInput, PgExecutor, SqlExecutor, StoreError};
use chrono::NaiveDate;

const LOCK_TIMEOUT_SECONDS: u64 = 5;

/// Helper to create the denormalized layout older deployments used
fn create_legacy_schema(executor: &PgExecutor) -> Result<(), StoreError> {
    for sql in [
        "CREATE TABLE blood_types (id SERIAL PRIMARY KEY, type TEXT NOT NULL UNIQUE)",
        "CREATE TABLE donors (id SERIAL PRIMARY KEY, name TEXT NOT NULL, blood_type TEXT, \
         phone TEXT, city TEXT, created_at TEXT NOT NULL, deleted_at TEXT)",
        "CREATE TABLE recipients (id SERIAL PRIMARY KEY, name TEXT NOT NULL, blood_type TEXT, \
         phone TEXT, hospital TEXT, created_at TEXT NOT NULL)",
        "CREATE TABLE donations (id SERIAL PRIMARY KEY, donor_id INTEGER NOT NULL, \
         units INTEGER NOT NULL, donation_date TEXT NOT NULL, expiry_date TEXT NOT NULL)",
        "CREATE TABLE requests (id SERIAL PRIMARY KEY, recipient_id INTEGER NOT NULL, \
         units INTEGER NOT NULL, status TEXT NOT NULL, request_date TEXT NOT NULL)",
        "CREATE TABLE inventory (id SERIAL PRIMARY KEY, blood_type TEXT, units INTEGER NOT NULL)",
    ] {
        executor.execute(sql, &[])?;
    }
    Ok(())
}

/// Helper to fill the legacy tables, including blank and oddly cased labels
fn seed_legacy_rows(executor: &PgExecutor) -> Result<(), StoreError> {
    for sql in [
        "INSERT INTO blood_types (type) VALUES ('B+')",
        "INSERT INTO donors (id, name, blood_type, phone, city, created_at, deleted_at) VALUES \
         (1, 'Ada', ' o+ ', '555-0101', 'Lisbon', '2024-01-05', NULL), \
         (2, 'Bob', '', NULL, 'Porto', '2024-01-06 09:30:00', NULL), \
         (3, 'Cy', NULL, NULL, NULL, '2024-01-07', NULL), \
         (7, 'Dee', 'A-', NULL, NULL, 'yesterday', '2024-02-01')",
        "INSERT INTO recipients (id, name, blood_type, phone, hospital, created_at) VALUES \
         (4, 'Grace', 'O+', NULL, 'St. Mary', '2024-01-10'), \
         (5, 'Hal', 'b+', NULL, NULL, '2024-01-11')",
        "INSERT INTO donations (id, donor_id, units, donation_date, expiry_date) VALUES \
         (10, 1, 4, '2024-01-05', '2024-02-16'), \
         (11, 7, 1, '2024-01-08', '2024-02-19')",
        "INSERT INTO requests (id, recipient_id, units, status, request_date) VALUES \
         (20, 4, 2, 'fulfilled', '2024-01-12'), \
         (21, 4, 1, ' Pending', '2024-01-13'), \
         (22, 5, 3, 'canceled', '2024-01-14')",
        "INSERT INTO inventory (id, blood_type, units) VALUES \
         (30, 'O+', 1), (31, 'o+ ', 1), (32, 'A-', 1)",
    ] {
        executor.execute(sql, &[])?;
    }
    Ok(())
}

/// Helper to read `(id, label)` pairs for a person table
fn labels(executor: &PgExecutor, table: &str) -> Vec<(i64, String)> {
    let sql = format!(
        "SELECT t.id::BIGINT, bt.label FROM {table} t \
         JOIN blood_types bt ON bt.id = t.blood_type_id ORDER BY t.id"
    );
    executor
        .query_all(&sql, &[])
        .expect("Failed to query labels")
        .iter()
        .map(|row| (row.get(0), row.get(1)))
        .collect()
}

/// Helper to dump every row of the normalized tables as JSON text
fn dump(executor: &PgExecutor) -> Vec<String> {
    let mut rows = Vec::new();
    for table in ["blood_types", "donors", "recipients", "donations", "requests", "inventory"] {
        let sql = format!("SELECT row_to_json(t)::text FROM {table} t ORDER BY t.id");
        for row in executor.query_all(&sql, &[]).expect("Failed to dump table") {
            rows.push(format!("{table}: {}", row.get::<_, String>(0)));
        }
    }
    rows
}

fn applied_versions(bank: &BloodBank) -> Vec<i64> {
    let mut versions: Vec<i64> = bank
        .migration_status()
        .expect("Failed to read migration status")
        .applied
        .iter()
        .map(|record| record.version)
        .collect();
    versions.sort_unstable();
    versions
}

#[test]
fn test_fresh_database_bootstrap() {
    let Some(db) = TestDatabase::try_new() else { return };
    let bank = db.bank().expect("Failed to open bank");

    let status = bank.migration_status().expect("status before migrating");
    assert!(!status.schema_present);
    assert!(status.applied.is_empty());

    let outcome = bank.migrate(LOCK_TIMEOUT_SECONDS).expect("Failed to migrate");
    assert!(outcome.created);
    assert!(!outcome.normalized);

    let status = bank.migration_status().expect("status after migrating");
    assert!(status.is_up_to_date());
    assert!(!status.lock_held, "lock must be released after migrating");
    assert!(!status.baseline_drifted);
    assert_eq!(status.latest_applied_version(), Some(BASELINE_VERSION));
    let record = &status.applied[0];
    assert_eq!(record.name, "create_schema");
    assert!(record.success, "Migration should be marked as successful");
    assert!(record.checksum.len() == 64, "Checksum should be SHA-256 (64 hex chars)");

    let again = bank.migrate(LOCK_TIMEOUT_SECONDS).expect("Failed to migrate twice");
    assert!(!again.changed());
    assert_eq!(applied_versions(&bank), vec![BASELINE_VERSION]);
}

#[test]
fn test_legacy_schema_is_normalized() {
    let Some(db) = TestDatabase::try_new() else { return };
    create_legacy_schema(db.executor()).expect("Failed to create legacy schema");
    seed_legacy_rows(db.executor()).expect("Failed to seed legacy rows");
    let bank = db.bank().expect("Failed to open bank");

    let status = bank.migration_status().expect("status before migrating");
    assert_eq!(status.legacy_tables, vec!["donors", "recipients", "inventory"]);
    assert!(!status.is_up_to_date());

    let outcome = bank.migrate(LOCK_TIMEOUT_SECONDS).expect("Failed to migrate");
    assert!(outcome.normalized);
    assert_eq!(applied_versions(&bank), vec![BASELINE_VERSION, NORMALIZE_VERSION]);
    assert!(bank.migration_status().expect("status").is_up_to_date());

    // Ids are kept; blank and missing labels fall back to UNKNOWN.
    assert_eq!(
        labels(db.executor(), "donors"),
        vec![
            (1, "O+".to_string()),
            (2, "UNKNOWN".to_string()),
            (3, "UNKNOWN".to_string()),
            (7, "A-".to_string()),
        ]
    );
    assert_eq!(
        labels(db.executor(), "recipients"),
        vec![(4, "O+".to_string()), (5, "B+".to_string())]
    );

    // Legacy text dates become DATE values; unparseable ones fall back to today.
    let row = db
        .executor()
        .query_one(
            "SELECT created_at, deleted_at IS NOT NULL FROM donors WHERE id = 2",
            &[],
        )
        .expect("Failed to read donor");
    assert_eq!(row.get::<_, NaiveDate>(0), NaiveDate::from_ymd_opt(2024, 1, 6).expect("date"));
    assert!(!row.get::<_, bool>(1));

    let statuses: Vec<String> = db
        .executor()
        .query_all("SELECT status FROM requests ORDER BY id", &[])
        .expect("Failed to read requests")
        .iter()
        .map(|row| row.get(0))
        .collect();
    assert_eq!(statuses, vec!["Fulfilled", "Pending", "Cancelled"]);

    // Duplicate spellings collapse into one inventory row per blood type.
    let o_pos = bank.balance("O+").expect("balance");
    assert_eq!(o_pos, 2);
    assert_eq!(bank.balance("A-").expect("balance"), 1);

    // The soft-deleted donor stays out of listings.
    let snapshot = bank.snapshot().expect("snapshot");
    assert!(snapshot.donors.iter().all(|d| d.id != 7));

    // Sequences continue after the highest migrated id.
    let next = bank
        .create_donor(&DonorInput {
            name: "Eve".to_string(),
            blood_type: "O+".to_string(),
            ..Default::default()
        })
        .expect("Failed to create donor after migration");
    assert_eq!(next, 8);
}

#[test]
fn test_second_run_is_a_noop() {
    let Some(db) = TestDatabase::try_new() else { return };
    create_legacy_schema(db.executor()).expect("Failed to create legacy schema");
    seed_legacy_rows(db.executor()).expect("Failed to seed legacy rows");
    let bank = db.bank().expect("Failed to open bank");

    bank.migrate(LOCK_TIMEOUT_SECONDS).expect("first run");
    let before = dump(db.executor());
    let versions = applied_versions(&bank);

    let outcome = bank.migrate(LOCK_TIMEOUT_SECONDS).expect("second run");
    assert!(!outcome.changed());
    assert_eq!(dump(db.executor()), before);
    assert_eq!(applied_versions(&bank), versions);
}

#[test]
fn test_failed_normalization_leaves_legacy_schema_untouched() {
    let Some(db) = TestDatabase::try_new() else { return };
    create_legacy_schema(db.executor()).expect("Failed to create legacy schema");
    seed_legacy_rows(db.executor()).expect("Failed to seed legacy rows");
    // Donations without a donor reference have no copy rule.
    db.executor()
        .execute("ALTER TABLE donations DROP COLUMN donor_id", &[])
        .expect("Failed to drop donor reference");
    let bank = db.bank().expect("Failed to open bank");

    assert!(bank.migrate(LOCK_TIMEOUT_SECONDS).is_err());

    let status = bank.migration_status().expect("status after failure");
    assert_eq!(status.legacy_tables, vec!["donors", "recipients", "inventory"]);
    assert!(!status.lock_held, "lock must be released after a failure");
    assert!(status
        .applied
        .iter()
        .all(|record| record.version != NORMALIZE_VERSION));

    let staged = db
        .executor()
        .query_one(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name LIKE '%\\_new'",
            &[],
        )
        .expect("Failed to count staging tables");
    assert_eq!(staged.get::<_, i64>(0), 0);
}

#[test]
fn test_invalid_calendar_dates_take_defaults() {
    let Some(db) = TestDatabase::try_new() else { return };
    create_legacy_schema(db.executor()).expect("Failed to create legacy schema");
    seed_legacy_rows(db.executor()).expect("Failed to seed legacy rows");
    for sql in [
        "UPDATE donors SET created_at = '2024-13-01' WHERE id = 3",
        "INSERT INTO donations (id, donor_id, units, donation_date, expiry_date) \
         VALUES (12, 1, 2, '2024-02-10', '2024-02-30')",
        "INSERT INTO requests (id, recipient_id, units, status, request_date) \
         VALUES (23, 5, 1, 'pending', '2023-02-29')",
    ] {
        db.executor().execute(sql, &[]).expect("Failed to insert legacy row");
    }
    let bank = db.bank().expect("Failed to open bank");

    bank.migrate(LOCK_TIMEOUT_SECONDS).expect("Failed to migrate");

    let expiry = db
        .executor()
        .query_one("SELECT expiry_date FROM donations WHERE id = 12", &[])
        .expect("Failed to read donation");
    assert_eq!(
        expiry.get::<_, NaiveDate>(0),
        NaiveDate::from_ymd_opt(2024, 2, 10).expect("date"),
        "an impossible expiry falls back to the donation date"
    );

    let today = db
        .executor()
        .query_one(
            "SELECT (SELECT created_at FROM donors WHERE id = 3) = CURRENT_DATE, \
             (SELECT request_date FROM requests WHERE id = 23) = CURRENT_DATE",
            &[],
        )
        .expect("Failed to read fallbacks");
    assert!(today.get::<_, bool>(0));
    assert!(today.get::<_, bool>(1));
    assert!(bank.migration_status().expect("status").is_up_to_date());
}

#[test]
fn test_orphaned_rows_are_kept_under_placeholder_parents() {
    let Some(db) = TestDatabase::try_new() else { return };
    create_legacy_schema(db.executor()).expect("Failed to create legacy schema");
    seed_legacy_rows(db.executor()).expect("Failed to seed legacy rows");
    for sql in [
        "INSERT INTO donations (id, donor_id, units, donation_date, expiry_date) \
         VALUES (12, 99, 1, '2024-01-09', '2024-02-20'), (13, 99, 2, '2024-01-10', '2024-02-21')",
        "INSERT INTO requests (id, recipient_id, units, status, request_date) \
         VALUES (24, 98, 1, 'pending', '2024-01-15')",
    ] {
        db.executor().execute(sql, &[]).expect("Failed to insert orphan row");
    }
    let bank = db.bank().expect("Failed to open bank");

    bank.migrate(LOCK_TIMEOUT_SECONDS).expect("Failed to migrate");

    let kept = db
        .executor()
        .query_one(
            "SELECT (SELECT COUNT(*) FROM donations WHERE donor_id = 99), \
             (SELECT COUNT(*) FROM requests WHERE recipient_id = 98)",
            &[],
        )
        .expect("Failed to count orphans");
    assert_eq!(kept.get::<_, i64>(0), 2);
    assert_eq!(kept.get::<_, i64>(1), 1);

    for (table, id) in [("donors", 99_i64), ("recipients", 98)] {
        let sql = format!(
            "SELECT t.name, bt.label, t.deleted_at IS NOT NULL FROM {table} t \
             JOIN blood_types bt ON bt.id = t.blood_type_id WHERE t.id = $1"
        );
        let row = db
            .executor()
            .query_one(&sql, &[&id])
            .expect("Failed to read placeholder");
        assert!(row.get::<_, String>(0).starts_with("Unknown"));
        assert_eq!(row.get::<_, String>(1), "UNKNOWN");
        assert!(row.get::<_, bool>(2), "placeholder {table} {id} must be deleted");
    }

    let snapshot = bank.snapshot().expect("snapshot");
    assert!(snapshot.donors.iter().all(|d| d.id != 99));
    assert!(snapshot.recipients.iter().all(|r| r.id != 98));
}

#[test]
fn test_rerun_replaces_leftover_staging_tables() {
    let Some(db) = TestDatabase::try_new() else { return };
    create_legacy_schema(db.executor()).expect("Failed to create legacy schema");
    seed_legacy_rows(db.executor()).expect("Failed to seed legacy rows");
    // Leftovers of a run that died before the legacy tables were replaced.
    for sql in [
        "CREATE TABLE donors_new (junk TEXT, more_junk INTEGER)",
        "INSERT INTO donors_new (junk, more_junk) VALUES ('stale', 1)",
        "CREATE TABLE inventory_new (id INTEGER, blood_type TEXT)",
    ] {
        db.executor().execute(sql, &[]).expect("Failed to create leftover table");
    }
    let bank = db.bank().expect("Failed to open bank");

    let outcome = bank.migrate(LOCK_TIMEOUT_SECONDS).expect("Failed to migrate over leftovers");
    assert!(outcome.normalized);
    assert!(bank.migration_status().expect("status").is_up_to_date());

    assert_eq!(
        labels(db.executor(), "donors"),
        vec![
            (1, "O+".to_string()),
            (2, "UNKNOWN".to_string()),
            (3, "UNKNOWN".to_string()),
            (7, "A-".to_string()),
        ]
    );
    assert_eq!(bank.balance("O+").expect("balance"), 2);

    let staged = db
        .executor()
        .query_one(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name LIKE '%\\_new'",
            &[],
        )
        .expect("Failed to count staging tables");
    assert_eq!(staged.get::<_, i64>(0), 0);
}
