//! Table-row migration lock
//!
//! The process that inserts the `version = -1` row into `bloodbank_migrations`
//! holds the lock; everyone else polls until it is deleted or the timeout
//! expires.

use super::state_table::STATE_TABLE;
use super::MigrationError;
use crate::executor::SqlExecutor;
use std::time::{Duration, Instant};

/// Reserved version of the lock row; real migrations use positive timestamps.
pub const LOCK_VERSION: i64 = -1;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Releases the lock when dropped.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the lock, waiting at most `timeout_seconds`.
    ///
    /// # Errors
    ///
    /// `MigrationError::LockTimeout` if another holder keeps it past the timeout.
    pub fn new(executor: &'a dyn SqlExecutor, timeout_seconds: u64) -> Result<Self, MigrationError> {
        acquire_migration_lock(executor, timeout_seconds)?;
        Ok(Self { executor })
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = release_migration_lock(self.executor) {
            log::error!("failed to release migration lock: {e}");
        }
    }
}

pub fn acquire_migration_lock(
    executor: &dyn SqlExecutor,
    timeout_seconds: u64,
) -> Result<(), MigrationError> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);

    // Per-attempt cap so a wedged insert cannot outlive the overall timeout.
    let _ = executor.execute("SET statement_timeout = '5s'", &[]);
    let sql = format!(
        "INSERT INTO {STATE_TABLE} (version, name, checksum, applied_at, success) \
         VALUES ({LOCK_VERSION}, 'LOCK', 'lock', NOW(), true) \
         ON CONFLICT (version) DO NOTHING"
    );

    let outcome = loop {
        if start.elapsed() >= timeout {
            break Err(MigrationError::LockTimeout(format!(
                "not acquired within {timeout_seconds} seconds; \
                 to clear a stale lock run: DELETE FROM {STATE_TABLE} WHERE version = {LOCK_VERSION}"
            )));
        }
        match executor.execute(&sql, &[]) {
            Ok(rows) if rows > 0 => break Ok(()),
            Ok(_) => log::debug!("migration lock busy, retrying"),
            Err(e) if is_statement_timeout(&e.to_string()) => {
                log::debug!("migration lock attempt timed out, retrying")
            }
            Err(e) => break Err(MigrationError::Database(e)),
        }
        may::coroutine::sleep(POLL_INTERVAL);
    };

    let _ = executor.execute("RESET statement_timeout", &[]);
    if outcome.is_ok() {
        log::debug!("migration lock acquired after {:?}", start.elapsed());
    }
    outcome
}

pub fn release_migration_lock(executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
    executor.execute(
        &format!("DELETE FROM {STATE_TABLE} WHERE version = {LOCK_VERSION}"),
        &[],
    )?;
    Ok(())
}

pub fn is_migration_lock_held(executor: &dyn SqlExecutor) -> Result<bool, MigrationError> {
    let row = executor.query_one(
        &format!("SELECT COUNT(*) FROM {STATE_TABLE} WHERE version = {LOCK_VERSION}"),
        &[],
    )?;
    let count: i64 = row.try_get(0)?;
    Ok(count > 0)
}

fn is_statement_timeout(message: &str) -> bool {
    message.contains("canceling statement") || message.contains("statement timeout")
}
