//! In-process migration on startup

use super::lock::MigrationLockGuard;
use super::normalize::{self, NORMALIZE_NAME, NORMALIZE_VERSION};
use super::schema::{self, LIVE};
use super::state_table::{initialize_state_table, record_applied};
use super::MigrationError;
use crate::executor::PgExecutor;
use crate::transaction::with_transaction;
use std::time::Instant;

pub const BASELINE_VERSION: i64 = 20240101000000;
pub const BASELINE_NAME: &str = "create_schema";

/// What a startup run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Legacy `blood_type` columns were rewritten
    pub normalized: bool,
    /// The entity tables did not exist and were created
    pub created: bool,
}

impl MigrationOutcome {
    pub fn changed(&self) -> bool {
        self.normalized || self.created
    }
}

/// Bring the database to the normalized schema.
///
/// Takes the migration lock, then inside one transaction normalizes any legacy
/// layout, creates missing tables and records what was applied. Running it
/// again against an up-to-date database changes nothing.
///
/// # Errors
///
/// Fails if the lock cannot be acquired within `lock_timeout_seconds` or any
/// statement fails; in the latter case the transaction is rolled back.
pub fn startup_migrations(
    executor: &PgExecutor,
    lock_timeout_seconds: u64,
) -> Result<MigrationOutcome, MigrationError> {
    initialize_state_table(executor)?;
    let _lock = MigrationLockGuard::new(executor, lock_timeout_seconds)?;

    let outcome = with_transaction(executor, |tx| -> Result<_, MigrationError> {
        let started = Instant::now();
        schema::ensure_blood_types(tx)?;
        let normalized = normalize::normalize_legacy(tx)?;
        if normalized {
            record_applied(
                tx,
                NORMALIZE_VERSION,
                NORMALIZE_NAME,
                &super::calculate_checksum(&normalize::normalize_script()),
                elapsed_ms(started),
            )?;
        }

        let created = schema::bootstrap(tx)?;
        record_applied(
            tx,
            BASELINE_VERSION,
            BASELINE_NAME,
            &schema::schema_checksum(&LIVE),
            elapsed_ms(started),
        )?;
        Ok(MigrationOutcome { normalized, created })
    })?;

    if outcome.changed() {
        log::info!("schema migration applied: {outcome:?}");
    } else {
        log::debug!("schema already up to date");
    }
    Ok(outcome)
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
