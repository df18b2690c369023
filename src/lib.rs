//! # Blood bank
//!
//! Record keeping for a blood bank on PostgreSQL, running on the `may`
//! coroutine runtime: donors, recipients, donations, blood requests and a
//! per-blood-type inventory ledger that never goes negative.
//!
//! [`BloodBank`] is the entry point. It owns one session, migrates the schema
//! on open (normalizing legacy free-text blood types into a lookup table) and
//! runs each operation in its own transaction. The [`web`] module serves the
//! same operations over HTTP.
//!
//! ```no_run
//! use bloodbank::{BloodBank, BloodBankConfig, DonorInput};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BloodBankConfig::load()?;
//! let bank = BloodBank::open(&config.database)?;
//!
//! let donor = bank.create_donor(&DonorInput {
//!     name: "Ada".into(),
//!     blood_type: "O+".into(),
//!     ..Default::default()
//! })?;
//! bank.record_donation(donor, 3, "2030-01-31")?;
//! assert_eq!(bank.balance("O+")?, 3);
//! # Ok(())
//! # }
//! ```

pub mod bank;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod registry;
pub mod transaction;
pub mod web;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use bank::{BloodBank, OpenError};
pub use config::{BloodBankConfig, DatabaseConfig, ServerConfig};
pub use connection::{connect, redact, validate_connection_string, ConnectionError};
pub use error::{BankError, BankResult};
pub use executor::{PgExecutor, SqlExecutor, StoreError};
pub use ledger::Ledger;
pub use migration::{MigrationError, MigrationOutcome, MigrationStatus};
pub use model::{
    BloodTypeLabel, BloodTypeRef, Discrepancy, Donation, DonationId, Donor, DonorId, DonorInput,
    InventoryLine, Recipient, RecipientId, RecipientInput, Request, RequestId, RequestStatus,
    Snapshot,
};
pub use registry::Registry;
pub use transaction::{with_transaction, Transaction, TransactionError};
