use super::{BloodTypeLabel, RequestStatus};
use crate::error::{BankError, BankResult};
use crate::executor::StoreError;
use chrono::NaiveDate;
use may_postgres::Row;
use serde::Serialize;

/// Parse a `YYYY-MM-DD` form value.
pub fn parse_date(field: &str, raw: &str) -> BankResult<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BankError::invalid(format!("{field} is required")));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| BankError::invalid(format!("{field} must be a YYYY-MM-DD date, got '{raw}'")))
}

/// Active donor as listed on the overview page.
///
/// Row order: `id`, `name`, `blood_type`, `phone`, `city`, `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Donor {
    pub id: i64,
    pub name: String,
    pub blood_type: String,
    pub phone: String,
    pub city: String,
    pub created_at: NaiveDate,
}

impl Donor {
    pub(crate) fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get(0)?,
            name: row.try_get(1)?,
            blood_type: row.try_get(2)?,
            phone: row.try_get::<_, Option<String>>(3)?.unwrap_or_default(),
            city: row.try_get::<_, Option<String>>(4)?.unwrap_or_default(),
            created_at: row.try_get(5)?,
        })
    }
}

/// Active recipient.
///
/// Row order: `id`, `name`, `blood_type`, `phone`, `hospital`, `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub id: i64,
    pub name: String,
    pub blood_type: String,
    pub phone: String,
    pub hospital: String,
    pub created_at: NaiveDate,
}

impl Recipient {
    pub(crate) fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get(0)?,
            name: row.try_get(1)?,
            blood_type: row.try_get(2)?,
            phone: row.try_get::<_, Option<String>>(3)?.unwrap_or_default(),
            hospital: row.try_get::<_, Option<String>>(4)?.unwrap_or_default(),
            created_at: row.try_get(5)?,
        })
    }
}

/// Active donation joined with its donor.
///
/// Row order: `id`, `donor_id`, `donor_name`, `blood_type`, `units`,
/// `donation_date`, `expiry_date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Donation {
    pub id: i64,
    pub donor_id: i64,
    pub donor_name: String,
    pub blood_type: String,
    pub units: i32,
    pub donation_date: NaiveDate,
    pub expiry_date: NaiveDate,
}

impl Donation {
    pub(crate) fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get(0)?,
            donor_id: row.try_get(1)?,
            donor_name: row.try_get(2)?,
            blood_type: row.try_get(3)?,
            units: row.try_get(4)?,
            donation_date: row.try_get(5)?,
            expiry_date: row.try_get(6)?,
        })
    }
}

/// Open or fulfilled request joined with its recipient.
///
/// Row order: `id`, `recipient_id`, `recipient_name`, `blood_type`, `units`,
/// `status`, `request_date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: i64,
    pub recipient_id: i64,
    pub recipient_name: String,
    pub blood_type: String,
    pub units: i32,
    pub status: RequestStatus,
    pub request_date: NaiveDate,
}

impl Request {
    pub(crate) fn from_row(row: &Row) -> Result<Self, StoreError> {
        let status: String = row.try_get(5)?;
        Ok(Self {
            id: row.try_get(0)?,
            recipient_id: row.try_get(1)?,
            recipient_name: row.try_get(2)?,
            blood_type: row.try_get(3)?,
            units: row.try_get(4)?,
            status: status.parse().map_err(StoreError::ParseError)?,
            request_date: row.try_get(6)?,
        })
    }
}

/// Current balance for one blood type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryLine {
    pub blood_type: String,
    pub units: i32,
}

/// A blood type whose stored balance disagrees with its donations and
/// fulfilled requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub blood_type_id: i64,
    pub blood_type: String,
    pub stored: i64,
    pub expected: i64,
}

/// Everything the overview page shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub donors: Vec<Donor>,
    pub recipients: Vec<Recipient>,
    pub donations: Vec<Donation>,
    pub inventory: Vec<InventoryLine>,
    pub requests: Vec<Request>,
}

/// Fields accepted when registering or updating a donor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DonorInput {
    pub name: String,
    pub blood_type: String,
    pub phone: String,
    pub city: String,
}

/// Fields accepted when registering or updating a recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientInput {
    pub name: String,
    pub blood_type: String,
    pub phone: String,
    pub hospital: String,
}

/// Trimmed person fields shared by donors and recipients; `locality` is the
/// donor's city or the recipient's hospital.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PersonFields {
    pub name: String,
    pub label: BloodTypeLabel,
    pub phone: String,
    pub locality: String,
}

fn person_fields(name: &str, blood_type: &str, phone: &str, locality: &str) -> BankResult<PersonFields> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BankError::invalid("name is required"));
    }
    Ok(PersonFields {
        name: name.to_string(),
        label: BloodTypeLabel::parse(blood_type)?,
        phone: phone.trim().to_string(),
        locality: locality.trim().to_string(),
    })
}

impl DonorInput {
    pub(crate) fn normalize(&self) -> BankResult<PersonFields> {
        person_fields(&self.name, &self.blood_type, &self.phone, &self.city)
    }
}

impl RecipientInput {
    pub(crate) fn normalize(&self) -> BankResult<PersonFields> {
        person_fields(&self.name, &self.blood_type, &self.phone, &self.hospital)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("expiry_date", " 2025-12-01 ").expect("valid"),
            NaiveDate::from_ymd_opt(2025, 12, 1).expect("date")
        );
        assert!(matches!(
            parse_date("expiry_date", ""),
            Err(BankError::InvalidArgument(_))
        ));
        assert!(parse_date("expiry_date", "12/01/2025").is_err());
        assert!(parse_date("expiry_date", "2025-02-30").is_err());
    }

    #[test]
    fn test_donor_input_normalizes() {
        let input = DonorInput {
            name: "  Ada Lovelace ".into(),
            blood_type: " o+".into(),
            phone: " 555-0100 ".into(),
            city: "London ".into(),
        };
        let fields = input.normalize().expect("valid");
        assert_eq!(fields.name, "Ada Lovelace");
        assert_eq!(fields.label.as_str(), "O+");
        assert_eq!(fields.phone, "555-0100");
        assert_eq!(fields.locality, "London");
    }

    #[test]
    fn test_person_requires_name_and_blood_type() {
        let missing_name = RecipientInput {
            blood_type: "A-".into(),
            ..Default::default()
        };
        assert!(matches!(
            missing_name.normalize(),
            Err(BankError::InvalidArgument(_))
        ));

        let missing_type = RecipientInput {
            name: "Grace".into(),
            ..Default::default()
        };
        assert!(missing_type.normalize().is_err());
    }
}
