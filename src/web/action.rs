//! Form posts mapped onto bank operations, and bank errors mapped back onto
//! the flash messages the page shows.

use super::form::Form;
use crate::bank::BloodBank;
use crate::error::{BankError, BankResult};
use crate::model::{DonorInput, RecipientInput, RequestStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateDonor(DonorInput),
    UpdateDonor(i64, DonorInput),
    DeleteDonor(i64),
    CreateRecipient(RecipientInput),
    UpdateRecipient(i64, RecipientInput),
    DeleteRecipient(i64),
    RecordDonation {
        donor_id: i64,
        units: i32,
        expiry_date: String,
    },
    RetireDonation(i64),
    CreateRequest {
        recipient_id: i64,
        units: i32,
    },
    AmendRequest {
        id: i64,
        units: i32,
        status: RequestStatus,
    },
    CancelRequest(i64),
    FulfillRequest(i64),
}

/// Result of decoding a post.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    Run(Action),
    /// Missing id on a delete or fulfill; redirect without doing anything
    Skip,
    /// Validation failed; show this message
    Reject(&'static str),
}

pub fn is_action_path(path: &str) -> bool {
    matches!(
        path,
        "/donors"
            | "/donors/update"
            | "/donors/delete"
            | "/recipients"
            | "/recipients/update"
            | "/recipients/delete"
            | "/donations"
            | "/donations/delete"
            | "/requests"
            | "/requests/update"
            | "/requests/delete"
            | "/fulfill"
    )
}

fn donor_input(form: &Form) -> DonorInput {
    DonorInput {
        name: form.text("name"),
        blood_type: form.text("blood_type"),
        phone: form.text("phone"),
        city: form.text("city"),
    }
}

fn recipient_input(form: &Form) -> RecipientInput {
    RecipientInput {
        name: form.text("name"),
        blood_type: form.text("blood_type"),
        phone: form.text("phone"),
        hospital: form.text("hospital"),
    }
}

fn by_id(form: &Form, action: fn(i64) -> Action) -> Decoded {
    match form.id("id") {
        0 => Decoded::Skip,
        id => Decoded::Run(action(id)),
    }
}

/// Decode the form posted to `path`. Returns `None` for unknown paths.
pub fn decode(path: &str, form: &Form) -> Option<Decoded> {
    let person_ok = !form.text("name").is_empty() && !form.text("blood_type").is_empty();
    let decoded = match path {
        "/donors" if person_ok => Decoded::Run(Action::CreateDonor(donor_input(form))),
        "/donors" => Decoded::Reject("Donor name and blood type are required."),
        "/donors/update" if person_ok && form.id("id") != 0 => {
            Decoded::Run(Action::UpdateDonor(form.id("id"), donor_input(form)))
        }
        "/donors/update" => Decoded::Reject("Donor update requires id, name, and blood type."),
        "/donors/delete" => by_id(form, Action::DeleteDonor),

        "/recipients" if person_ok => Decoded::Run(Action::CreateRecipient(recipient_input(form))),
        "/recipients" => Decoded::Reject("Recipient name and blood type are required."),
        "/recipients/update" if person_ok && form.id("id") != 0 => {
            Decoded::Run(Action::UpdateRecipient(form.id("id"), recipient_input(form)))
        }
        "/recipients/update" => {
            Decoded::Reject("Recipient update requires id, name, and blood type.")
        }
        "/recipients/delete" => by_id(form, Action::DeleteRecipient),

        "/donations" => {
            let (donor_id, units, expiry_date) =
                (form.id("donor_id"), form.units("units"), form.text("expiry_date"));
            if donor_id == 0 || units <= 0 || expiry_date.is_empty() {
                Decoded::Reject("Donation requires donor, units, and expiry date.")
            } else {
                Decoded::Run(Action::RecordDonation {
                    donor_id,
                    units,
                    expiry_date,
                })
            }
        }
        "/donations/delete" => by_id(form, Action::RetireDonation),

        "/requests" => {
            let (recipient_id, units) = (form.id("recipient_id"), form.units("units"));
            if recipient_id == 0 || units <= 0 {
                Decoded::Reject("Request requires recipient and units.")
            } else {
                Decoded::Run(Action::CreateRequest { recipient_id, units })
            }
        }
        "/requests/update" => {
            let (id, units) = (form.id("id"), form.units("units"));
            match form.text("status").parse::<RequestStatus>() {
                Ok(status) if id != 0 && units > 0 => {
                    Decoded::Run(Action::AmendRequest { id, units, status })
                }
                _ => Decoded::Reject("Request update requires id, units, and status."),
            }
        }
        "/requests/delete" => by_id(form, Action::CancelRequest),
        "/fulfill" => by_id(form, Action::FulfillRequest),
        _ => return None,
    };
    Some(decoded)
}

impl Action {
    pub fn apply(&self, bank: &BloodBank) -> BankResult<()> {
        match self {
            Action::CreateDonor(input) => bank.create_donor(input).map(drop),
            Action::UpdateDonor(id, input) => bank.update_donor(*id, input),
            Action::DeleteDonor(id) => bank.delete_donor(*id),
            Action::CreateRecipient(input) => bank.create_recipient(input).map(drop),
            Action::UpdateRecipient(id, input) => bank.update_recipient(*id, input),
            Action::DeleteRecipient(id) => bank.delete_recipient(*id),
            Action::RecordDonation {
                donor_id,
                units,
                expiry_date,
            } => bank
                .record_donation(*donor_id, *units, expiry_date)
                .map(drop),
            Action::RetireDonation(id) => bank.retire_donation(*id),
            Action::CreateRequest {
                recipient_id,
                units,
            } => bank.create_request(*recipient_id, *units).map(drop),
            Action::AmendRequest { id, units, status } => {
                bank.amend_request(*id, *units, *status)
            }
            Action::CancelRequest(id) => bank.cancel_request(*id),
            Action::FulfillRequest(id) => bank.fulfill_request(*id),
        }
    }

    /// Message shown when `err` rejected this action.
    pub fn flash(&self, err: &BankError) -> &'static str {
        use BankError::*;
        match (self, err) {
            (_, InsufficientInventory { .. }) => "Not enough inventory to fulfill request.",
            (_, DonationConsumed { .. }) => {
                "Cannot delete donation because inventory is already used."
            }
            (Action::CancelRequest(_), ImmutableFulfilledRequest { .. }) => {
                "Cannot delete a fulfilled request."
            }
            (_, ImmutableFulfilledRequest { .. }) => "Cannot modify a fulfilled request.",
            (Action::CancelRequest(_), InvalidTransition { .. }) => "Request not found.",
            (_, InvalidTransition { .. }) => "Cannot change a cancelled request.",
            (Action::UpdateDonor(..), BloodTypeLocked { .. }) => {
                "Cannot change the blood type of a donor with active donations."
            }
            (_, BloodTypeLocked { .. }) => {
                "Cannot change the blood type of a recipient with fulfilled requests."
            }

            (Action::CreateDonor(_), InvalidArgument(_)) => {
                "Donor name and blood type are required."
            }
            (Action::CreateDonor(_), _) => "Could not add donor.",
            (Action::UpdateDonor(..), InvalidArgument(_)) => {
                "Donor update requires id, name, and blood type."
            }
            (Action::UpdateDonor(..) | Action::DeleteDonor(_), NotFound(_)) => "Donor not found.",
            (Action::UpdateDonor(..), _) => "Could not update donor.",
            (Action::DeleteDonor(_), _) => "Could not delete donor.",

            (Action::CreateRecipient(_), InvalidArgument(_)) => {
                "Recipient name and blood type are required."
            }
            (Action::CreateRecipient(_), _) => "Could not add recipient.",
            (Action::UpdateRecipient(..), InvalidArgument(_)) => {
                "Recipient update requires id, name, and blood type."
            }
            (Action::UpdateRecipient(..) | Action::DeleteRecipient(_), NotFound(_)) => {
                "Recipient not found."
            }
            (Action::UpdateRecipient(..), _) => "Could not update recipient.",
            (Action::DeleteRecipient(_), _) => "Could not delete recipient.",

            (Action::RecordDonation { .. }, InvalidArgument(_)) => {
                "Donation requires donor, units, and a YYYY-MM-DD expiry date."
            }
            (Action::RecordDonation { .. }, NotFound(_)) => {
                "Donation requires a valid donor with blood type."
            }
            (Action::RecordDonation { .. }, _) => "Could not add donation.",
            (Action::RetireDonation(_), NotFound(_)) => "Donation not found.",
            (Action::RetireDonation(_), _) => "Could not delete donation.",

            (Action::CreateRequest { .. }, InvalidArgument(_)) => {
                "Request requires recipient and units."
            }
            (Action::CreateRequest { .. }, NotFound(_)) => {
                "Request requires a valid recipient with blood type."
            }
            (Action::CreateRequest { .. }, _) => "Could not add request.",
            (Action::AmendRequest { .. }, InvalidArgument(_)) => {
                "Request update requires id, units, and status."
            }
            (
                Action::AmendRequest { .. } | Action::CancelRequest(_) | Action::FulfillRequest(_),
                NotFound(_),
            ) => "Request not found.",
            (Action::CancelRequest(_), _) => "Could not delete request.",
            (Action::AmendRequest { .. } | Action::FulfillRequest(_), _) => {
                "Could not update request."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_body(path: &str, body: &str) -> Option<Decoded> {
        decode(path, &Form::parse(body))
    }

    #[test]
    fn test_unknown_path() {
        assert_eq!(decode_body("/nope", ""), None);
        assert!(!is_action_path("/"));
        assert!(is_action_path("/fulfill"));
    }

    #[test]
    fn test_donor_validation_messages() {
        assert_eq!(
            decode_body("/donors", "name=&blood_type=O%2B"),
            Some(Decoded::Reject("Donor name and blood type are required."))
        );
        assert_eq!(
            decode_body("/donors/update", "name=Ada&blood_type=O%2B"),
            Some(Decoded::Reject("Donor update requires id, name, and blood type."))
        );
        match decode_body("/donors", "name=Ada&blood_type=o%2B&city=Leeds") {
            Some(Decoded::Run(Action::CreateDonor(input))) => {
                assert_eq!(input.name, "Ada");
                assert_eq!(input.city, "Leeds");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_id_skips() {
        for path in ["/donors/delete", "/donations/delete", "/requests/delete", "/fulfill"] {
            assert_eq!(decode_body(path, "id="), Some(Decoded::Skip), "{path}");
        }
        assert_eq!(
            decode_body("/fulfill", "id=12"),
            Some(Decoded::Run(Action::FulfillRequest(12)))
        );
    }

    #[test]
    fn test_donation_and_request_validation() {
        assert_eq!(
            decode_body("/donations", "donor_id=3&units=0&expiry_date=2030-01-01"),
            Some(Decoded::Reject("Donation requires donor, units, and expiry date."))
        );
        assert_eq!(
            decode_body("/requests", "recipient_id=&units=2"),
            Some(Decoded::Reject("Request requires recipient and units."))
        );
        assert_eq!(
            decode_body("/requests/update", "id=4&units=2&status=Shipped"),
            Some(Decoded::Reject("Request update requires id, units, and status."))
        );
        assert_eq!(
            decode_body("/requests/update", "id=4&units=2&status=Fulfilled"),
            Some(Decoded::Run(Action::AmendRequest {
                id: 4,
                units: 2,
                status: RequestStatus::Fulfilled
            }))
        );
    }

    #[test]
    fn test_flash_messages() {
        let short = BankError::InsufficientInventory {
            blood_type_id: 1,
            requested: 5,
        };
        assert_eq!(
            Action::FulfillRequest(1).flash(&short),
            "Not enough inventory to fulfill request."
        );
        assert_eq!(
            Action::RetireDonation(1).flash(&BankError::DonationConsumed { donation_id: 1 }),
            "Cannot delete donation because inventory is already used."
        );
        let frozen = BankError::ImmutableFulfilledRequest { request_id: 1 };
        assert_eq!(
            Action::CancelRequest(1).flash(&frozen),
            "Cannot delete a fulfilled request."
        );
        assert_eq!(
            Action::AmendRequest {
                id: 1,
                units: 1,
                status: RequestStatus::Pending
            }
            .flash(&frozen),
            "Cannot modify a fulfilled request."
        );
        assert_eq!(
            Action::RetireDonation(9).flash(&BankError::not_found("donation 9")),
            "Donation not found."
        );
    }
}
