//! Domain records
//!
//! Row types returned by the listing queries, the inputs accepted by the
//! lifecycle operations, and the blood-type and request-status value types.

mod blood_type;
mod records;
mod request_status;

pub use blood_type::{normalize_label, BloodTypeLabel, BloodTypeRef, UNKNOWN_LABEL};
pub use records::{
    parse_date, Discrepancy, Donation, Donor, DonorInput, InventoryLine, Recipient,
    RecipientInput, Request, Snapshot,
};
pub(crate) use records::PersonFields;
pub use request_status::{AmendPlan, AmendRejection, RequestStatus};

pub type DonorId = i64;
pub type RecipientId = i64;
pub type DonationId = i64;
pub type RequestId = i64;
