//! Entity mutations and the ledger movements they imply.
//!
//! Every function here takes the executor it should run on and assumes the
//! caller wraps it in a transaction; [`crate::BloodBank`] does that.

pub mod donation;
pub mod people;
pub mod request;
pub mod snapshot;

pub use donation::{record_donation, retire_donation};
pub use people::{
    create_donor, create_recipient, delete_donor, delete_recipient, update_donor, update_recipient,
};
pub use request::{amend, cancel, create_request, fulfill};
pub use snapshot::snapshot;
