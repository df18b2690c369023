//! Donations credit the ledger when recorded and debit it when retired.

use super::people::donor_blood_type;
use crate::error::{BankError, BankResult};
use crate::executor::SqlExecutor;
use crate::ledger::Ledger;
use crate::model::{parse_date, BloodTypeRef, DonationId, DonorId};

/// Record a donation dated today and credit its units to the donor's blood type.
///
/// Must run inside a transaction: the insert and the credit commit together.
///
/// # Errors
///
/// * `InvalidArgument` for non-positive units or a malformed expiry date
/// * `NotFound` when the donor is missing or removed
pub fn record_donation(
    executor: &dyn SqlExecutor,
    donor_id: DonorId,
    units: i32,
    expiry_date: &str,
) -> BankResult<DonationId> {
    if units <= 0 {
        return Err(BankError::invalid("donation units must be greater than zero"));
    }
    let expiry = parse_date("expiry_date", expiry_date)?;
    let blood_type = donor_blood_type(executor, donor_id)?;

    let row = executor.query_one(
        "INSERT INTO donations (donor_id, units, donation_date, expiry_date) \
         VALUES ($1, $2, CURRENT_DATE, $3) RETURNING id",
        &[&donor_id, &units, &expiry],
    )?;
    let id: DonationId = row.try_get(0)?;
    Ledger::new(executor).credit(blood_type, units)?;

    log::info!("recorded donation {id}: {units} unit(s) from donor {donor_id}");
    Ok(id)
}

/// Soft-delete a donation after taking its units back out of inventory.
///
/// # Errors
///
/// * `NotFound` when the donation is missing or already retired
/// * `DonationConsumed` when the balance no longer covers the donation; the
///   donation stays active
pub fn retire_donation(executor: &dyn SqlExecutor, donation_id: DonationId) -> BankResult<()> {
    let row = executor
        .query_opt(
            "SELECT dn.blood_type_id, d.units \
             FROM donations d JOIN donors dn ON dn.id = d.donor_id \
             WHERE d.id = $1 AND d.deleted_at IS NULL \
             FOR UPDATE OF d",
            &[&donation_id],
        )?
        .ok_or_else(|| BankError::not_found(format!("donation {donation_id}")))?;
    let blood_type = BloodTypeRef(row.try_get(0)?);
    let units: i32 = row.try_get(1)?;

    let ledger = Ledger::new(executor);
    if !ledger.debit(blood_type, units)? {
        return Err(BankError::DonationConsumed { donation_id });
    }
    executor.execute(
        "UPDATE donations SET deleted_at = NOW() WHERE id = $1",
        &[&donation_id],
    )?;
    if ledger.retire_if_reversed(blood_type)? {
        log::debug!("inventory for blood type {blood_type} has no remaining donations");
    }

    log::info!("retired donation {donation_id} ({units} unit(s))");
    Ok(())
}
