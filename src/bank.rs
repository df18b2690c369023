//! The `BloodBank` handle.
//!
//! Owns one session behind a coroutine-aware mutex. Every operation holds the
//! mutex for the length of its transaction, so statements from different
//! callers never interleave inside one session, and commits or rolls back as
//! a unit.

use crate::config::DatabaseConfig;
use crate::connection::{connect, ConnectionError};
use crate::error::{BankError, BankResult};
use crate::executor::PgExecutor;
use crate::ledger::Ledger;
use crate::lifecycle;
use crate::migration::{self, MigrationError, MigrationOutcome, MigrationStatus};
use crate::model::{
    BloodTypeLabel, BloodTypeRef, Discrepancy, DonationId, DonorId, DonorInput, InventoryLine,
    RecipientId, RecipientInput, RequestId, RequestStatus, Snapshot,
};
use crate::registry::Registry;
use crate::transaction::{with_transaction, Transaction};
use may::sync::{Mutex, MutexGuard};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Failure while opening a [`BloodBank`].
#[derive(Debug)]
pub enum OpenError {
    Connection(ConnectionError),
    Migration(MigrationError),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::Connection(e) => write!(f, "Cannot connect: {e}"),
            OpenError::Migration(e) => write!(f, "Cannot migrate schema: {e}"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenError::Connection(e) => Some(e),
            OpenError::Migration(e) => Some(e),
        }
    }
}

impl From<ConnectionError> for OpenError {
    fn from(err: ConnectionError) -> Self {
        OpenError::Connection(err)
    }
}

impl From<MigrationError> for OpenError {
    fn from(err: MigrationError) -> Self {
        OpenError::Migration(err)
    }
}

pub struct BloodBank {
    executor: Mutex<PgExecutor>,
}

impl BloodBank {
    /// Connect, bring the schema up to date and return a ready handle.
    ///
    /// # Errors
    ///
    /// `OpenError` if the connection or the startup migration fails.
    pub fn open(config: &DatabaseConfig) -> Result<Self, OpenError> {
        let client = connect(&config.url)?;
        let bank = Self::from_executor(PgExecutor::new(client));
        bank.migrate(config.migration_lock_timeout_seconds)?;
        Ok(bank)
    }

    /// Wrap an existing session without touching the schema.
    pub fn from_executor(executor: PgExecutor) -> Self {
        Self {
            executor: Mutex::new(executor),
        }
    }

    /// Run the startup migration; safe to repeat.
    pub fn migrate(&self, lock_timeout_seconds: u64) -> Result<MigrationOutcome, MigrationError> {
        let executor = self.session();
        migration::startup_migrations(&executor, lock_timeout_seconds)
    }

    pub fn migration_status(&self) -> Result<MigrationStatus, MigrationError> {
        let executor = self.session();
        migration::migration_status(&*executor)
    }

    pub fn check_health(&self) -> bool {
        match self.session().check_health() {
            Ok(alive) => alive,
            Err(e) => {
                log::warn!("health check failed: {e}");
                false
            }
        }
    }

    // Lookup registry

    pub fn resolve_or_create_blood_type(&self, label: &str) -> BankResult<BloodTypeRef> {
        self.run("resolve_or_create_blood_type", |tx| {
            Registry::new(tx).resolve_or_create(label)
        })
    }

    pub fn resolve_blood_type(&self, label: &str) -> BankResult<BloodTypeRef> {
        self.run("resolve_blood_type", |tx| Registry::new(tx).resolve(label))
    }

    pub fn blood_types(&self) -> BankResult<Vec<(BloodTypeRef, BloodTypeLabel)>> {
        self.run("blood_types", |tx| Registry::new(tx).list())
    }

    // Donors and recipients

    pub fn create_donor(&self, input: &DonorInput) -> BankResult<DonorId> {
        self.run("create_donor", |tx| lifecycle::create_donor(tx, input))
    }

    pub fn update_donor(&self, id: DonorId, input: &DonorInput) -> BankResult<()> {
        self.run("update_donor", |tx| lifecycle::update_donor(tx, id, input))
    }

    pub fn delete_donor(&self, id: DonorId) -> BankResult<()> {
        self.run("delete_donor", |tx| lifecycle::delete_donor(tx, id))
    }

    pub fn create_recipient(&self, input: &RecipientInput) -> BankResult<RecipientId> {
        self.run("create_recipient", |tx| lifecycle::create_recipient(tx, input))
    }

    pub fn update_recipient(&self, id: RecipientId, input: &RecipientInput) -> BankResult<()> {
        self.run("update_recipient", |tx| {
            lifecycle::update_recipient(tx, id, input)
        })
    }

    pub fn delete_recipient(&self, id: RecipientId) -> BankResult<()> {
        self.run("delete_recipient", |tx| lifecycle::delete_recipient(tx, id))
    }

    // Donations

    /// Record a donation and credit inventory in one transaction.
    pub fn record_donation(
        &self,
        donor_id: DonorId,
        units: i32,
        expiry_date: &str,
    ) -> BankResult<DonationId> {
        self.run("record_donation", |tx| {
            lifecycle::record_donation(tx, donor_id, units, expiry_date)
        })
    }

    /// Debit inventory and retire the donation, or reject with
    /// [`BankError::DonationConsumed`] and change nothing.
    pub fn retire_donation(&self, donation_id: DonationId) -> BankResult<()> {
        self.run("retire_donation", |tx| {
            lifecycle::retire_donation(tx, donation_id)
        })
    }

    // Requests

    pub fn create_request(&self, recipient_id: RecipientId, units: i32) -> BankResult<RequestId> {
        self.run("create_request", |tx| {
            lifecycle::create_request(tx, recipient_id, units)
        })
    }

    pub fn fulfill_request(&self, request_id: RequestId) -> BankResult<()> {
        self.run("fulfill_request", |tx| lifecycle::fulfill(tx, request_id))
    }

    pub fn amend_request(
        &self,
        request_id: RequestId,
        units: i32,
        status: RequestStatus,
    ) -> BankResult<()> {
        self.run("amend_request", |tx| {
            lifecycle::amend(tx, request_id, units, status)
        })
    }

    pub fn cancel_request(&self, request_id: RequestId) -> BankResult<()> {
        self.run("cancel_request", |tx| lifecycle::cancel(tx, request_id))
    }

    // Inventory

    /// Balance for a label; 0 when the label was never registered.
    pub fn balance(&self, label: &str) -> BankResult<i32> {
        self.run("balance", |tx| match Registry::new(tx).resolve(label) {
            Ok(blood_type) => Ledger::new(tx).balance(blood_type),
            Err(BankError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        })
    }

    pub fn balances(&self) -> BankResult<Vec<InventoryLine>> {
        self.run("balances", |tx| Ledger::new(tx).balances())
    }

    pub fn reconcile(&self) -> BankResult<Vec<Discrepancy>> {
        self.run("reconcile", |tx| Ledger::new(tx).reconcile())
    }

    pub fn snapshot(&self) -> BankResult<Snapshot> {
        self.run("snapshot", |tx| lifecycle::snapshot(tx))
    }

    fn run<T>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&Transaction) -> BankResult<T>,
    ) -> BankResult<T> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::lifecycle_span(operation).entered();

        let executor = self.session();
        let result = with_transaction(&executor, body);
        match &result {
            Err(e) if e.is_business_rule() => log::debug!("{operation} rejected: {e}"),
            Err(e) => log::error!("{operation} failed: {e}"),
            Ok(_) => {}
        }
        result
    }

    fn session(&self) -> MutexGuard<'_, PgExecutor> {
        // A panic mid-operation leaves the transaction to the rollback in
        // `Transaction::drop`, so the session is still usable.
        self.executor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
