//! Demo data for a fresh database.

use bloodbank::{BankError, BloodBank, DonorInput, RecipientInput};
use chrono::{Duration, Local};
use fake::faker::address::en::CityName;
use fake::faker::company::en::CompanyName;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::seq::SliceRandom;
use rand::Rng;

const LABELS: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

#[derive(Debug, Default)]
pub struct SeedSummary {
    pub donors: usize,
    pub donations: usize,
    pub recipients: usize,
    pub requests: usize,
    pub fulfilled: usize,
}

fn label<R: Rng + ?Sized>(rng: &mut R) -> String {
    LABELS.choose(rng).copied().unwrap_or("O+").to_string()
}

pub fn seed(bank: &BloodBank, donors: usize, recipients: usize) -> Result<SeedSummary, BankError> {
    let mut rng = rand::thread_rng();
    let mut summary = SeedSummary::default();
    let today = Local::now().date_naive();

    for _ in 0..donors {
        let donor = bank.create_donor(&DonorInput {
            name: Name().fake_with_rng(&mut rng),
            blood_type: label(&mut rng),
            phone: PhoneNumber().fake_with_rng(&mut rng),
            city: CityName().fake_with_rng(&mut rng),
        })?;
        summary.donors += 1;

        for _ in 0..rng.gen_range(1..=3) {
            let expiry = today + Duration::days(rng.gen_range(7..=42));
            bank.record_donation(donor, rng.gen_range(1..=4), &expiry.format("%Y-%m-%d").to_string())?;
            summary.donations += 1;
        }
    }

    for _ in 0..recipients {
        let company: String = CompanyName().fake_with_rng(&mut rng);
        let recipient = bank.create_recipient(&RecipientInput {
            name: Name().fake_with_rng(&mut rng),
            blood_type: label(&mut rng),
            phone: PhoneNumber().fake_with_rng(&mut rng),
            hospital: format!("{company} Hospital"),
        })?;
        summary.recipients += 1;

        let request = bank.create_request(recipient, rng.gen_range(1..=3))?;
        summary.requests += 1;
        if rng.gen_bool(0.5) {
            match bank.fulfill_request(request) {
                Ok(()) => summary.fulfilled += 1,
                Err(BankError::InsufficientInventory { .. }) => {
                    log::debug!("request {request} left pending: not enough inventory");
                }
                Err(e) => return Err(e),
            }
        }
    }

    log::info!("seeded {summary:?}");
    Ok(summary)
}
