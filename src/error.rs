//! Domain error type returned by every blood bank operation.

use crate::executor::StoreError;
use crate::model::RequestStatus;
use crate::transaction::TransactionError;
use std::fmt;

/// Result alias used throughout the domain layer
pub type BankResult<T> = Result<T, BankError>;

/// Errors returned by registry, ledger and lifecycle operations
///
/// Everything except [`BankError::Storage`] is a business-rule rejection: the
/// operation was refused and no state changed.
#[derive(Debug)]
pub enum BankError {
    /// Missing or empty field, non-positive units, malformed date
    InvalidArgument(String),
    /// Referenced record does not exist or is soft-deleted
    NotFound(String),
    /// Debit would drive the balance for a blood type negative
    InsufficientInventory { blood_type_id: i64, requested: i32 },
    /// Donation units were already consumed, so it cannot be retired
    DonationConsumed { donation_id: i64 },
    /// Attempted change to a fulfilled request
    ImmutableFulfilledRequest { request_id: i64 },
    /// Request status change that the state machine does not allow
    InvalidTransition {
        request_id: i64,
        from: RequestStatus,
        to: RequestStatus,
    },
    /// Blood type change on a donor with active donations or a recipient
    /// with fulfilled requests
    BloodTypeLocked { entity: &'static str, id: i64 },
    /// Underlying persistence failure; the whole operation may be retried
    Storage(StoreError),
}

impl BankError {
    /// `true` for rejections the caller can act on, `false` for storage faults.
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, BankError::Storage(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        BankError::InvalidArgument(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        BankError::NotFound(msg.into())
    }
}

impl fmt::Display for BankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            BankError::NotFound(msg) => write!(f, "Not found: {msg}"),
            BankError::InsufficientInventory {
                blood_type_id,
                requested,
            } => write!(
                f,
                "Insufficient inventory: {requested} unit(s) requested for blood type {blood_type_id}"
            ),
            BankError::DonationConsumed { donation_id } => write!(
                f,
                "Donation {donation_id} cannot be retired: its units are already used"
            ),
            BankError::ImmutableFulfilledRequest { request_id } => {
                write!(f, "Request {request_id} is fulfilled and cannot be modified")
            }
            BankError::InvalidTransition {
                request_id,
                from,
                to,
            } => write!(
                f,
                "Request {request_id} cannot move from {from} to {to}"
            ),
            BankError::BloodTypeLocked { entity, id } => write!(
                f,
                "Blood type of {entity} {id} is locked by recorded ledger movements"
            ),
            BankError::Storage(e) => write!(f, "Storage failure: {e}"),
        }
    }
}

impl std::error::Error for BankError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BankError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for BankError {
    fn from(err: StoreError) -> Self {
        BankError::Storage(err)
    }
}

impl From<may_postgres::Error> for BankError {
    fn from(err: may_postgres::Error) -> Self {
        BankError::Storage(StoreError::PostgresError(err))
    }
}

impl From<TransactionError> for BankError {
    fn from(err: TransactionError) -> Self {
        BankError::Storage(err.into())
    }
}
