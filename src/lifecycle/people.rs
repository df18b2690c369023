//! Donor and recipient maintenance.
//!
//! Both tables share one shape (name, blood type, phone, a locality column),
//! so the statements are built from a [`PersonTable`] description.

use crate::error::{BankError, BankResult};
use crate::executor::SqlExecutor;
use crate::model::{BloodTypeRef, DonorId, DonorInput, PersonFields, RecipientId, RecipientInput};
use crate::registry::Registry;

struct PersonTable {
    table: &'static str,
    locality: &'static str,
    noun: &'static str,
    /// Returns a row when changing the blood type would move units that the
    /// ledger has already accounted for.
    ledger_dependents: &'static str,
}

const DONORS: PersonTable = PersonTable {
    table: "donors",
    locality: "city",
    noun: "donor",
    ledger_dependents: "SELECT 1 FROM donations WHERE donor_id = $1 AND deleted_at IS NULL LIMIT 1",
};

const RECIPIENTS: PersonTable = PersonTable {
    table: "recipients",
    locality: "hospital",
    noun: "recipient",
    ledger_dependents: "SELECT 1 FROM requests WHERE recipient_id = $1 AND status = 'Fulfilled' LIMIT 1",
};

pub fn create_donor(executor: &dyn SqlExecutor, input: &DonorInput) -> BankResult<DonorId> {
    insert(executor, &DONORS, input.normalize()?)
}

pub fn update_donor(executor: &dyn SqlExecutor, id: DonorId, input: &DonorInput) -> BankResult<()> {
    update(executor, &DONORS, id, input.normalize()?)
}

pub fn delete_donor(executor: &dyn SqlExecutor, id: DonorId) -> BankResult<()> {
    soft_delete(executor, &DONORS, id)
}

pub fn create_recipient(executor: &dyn SqlExecutor, input: &RecipientInput) -> BankResult<RecipientId> {
    insert(executor, &RECIPIENTS, input.normalize()?)
}

pub fn update_recipient(
    executor: &dyn SqlExecutor,
    id: RecipientId,
    input: &RecipientInput,
) -> BankResult<()> {
    update(executor, &RECIPIENTS, id, input.normalize()?)
}

pub fn delete_recipient(executor: &dyn SqlExecutor, id: RecipientId) -> BankResult<()> {
    soft_delete(executor, &RECIPIENTS, id)
}

/// Blood type of an active donor.
pub(crate) fn donor_blood_type(executor: &dyn SqlExecutor, id: DonorId) -> BankResult<BloodTypeRef> {
    active_blood_type(executor, &DONORS, id)
}

/// Blood type of an active recipient.
pub(crate) fn recipient_blood_type(
    executor: &dyn SqlExecutor,
    id: RecipientId,
) -> BankResult<BloodTypeRef> {
    active_blood_type(executor, &RECIPIENTS, id)
}

fn insert(executor: &dyn SqlExecutor, people: &PersonTable, fields: PersonFields) -> BankResult<i64> {
    let blood_type = Registry::new(executor).resolve_or_create_label(&fields.label)?;
    let sql = format!(
        "INSERT INTO {} (name, blood_type_id, phone, {}, created_at) \
         VALUES ($1, $2, $3, $4, CURRENT_DATE) RETURNING id",
        people.table, people.locality
    );
    let row = executor.query_one(
        &sql,
        &[&fields.name, &blood_type.id(), &fields.phone, &fields.locality],
    )?;
    let id: i64 = row.try_get(0)?;
    log::info!("registered {} {id} ({})", people.noun, fields.label);
    Ok(id)
}

fn update(
    executor: &dyn SqlExecutor,
    people: &PersonTable,
    id: i64,
    fields: PersonFields,
) -> BankResult<()> {
    let current = lock_active(executor, people, id)?;
    let blood_type = Registry::new(executor).resolve_or_create_label(&fields.label)?;

    if blood_type != current && executor.query_opt(people.ledger_dependents, &[&id])?.is_some() {
        return Err(BankError::BloodTypeLocked {
            entity: people.noun,
            id,
        });
    }

    let sql = format!(
        "UPDATE {} SET name = $2, blood_type_id = $3, phone = $4, {} = $5 WHERE id = $1",
        people.table, people.locality
    );
    executor.execute(
        &sql,
        &[&id, &fields.name, &blood_type.id(), &fields.phone, &fields.locality],
    )?;
    Ok(())
}

fn soft_delete(executor: &dyn SqlExecutor, people: &PersonTable, id: i64) -> BankResult<()> {
    let sql = format!(
        "UPDATE {} SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        people.table
    );
    if executor.execute(&sql, &[&id])? == 0 {
        return Err(BankError::not_found(format!("{} {id}", people.noun)));
    }
    log::info!("removed {} {id}", people.noun);
    Ok(())
}

/// Shares the row lock with other readers, so a concurrent blood type change
/// waits until the caller's ledger movement has committed.
fn active_blood_type(executor: &dyn SqlExecutor, people: &PersonTable, id: i64) -> BankResult<BloodTypeRef> {
    select_blood_type(executor, people, id, " FOR SHARE")
}

/// Like [`active_blood_type`], but holds the row until the transaction ends.
fn lock_active(executor: &dyn SqlExecutor, people: &PersonTable, id: i64) -> BankResult<BloodTypeRef> {
    select_blood_type(executor, people, id, " FOR UPDATE")
}

fn select_blood_type(
    executor: &dyn SqlExecutor,
    people: &PersonTable,
    id: i64,
    locking: &str,
) -> BankResult<BloodTypeRef> {
    let sql = format!(
        "SELECT blood_type_id FROM {} WHERE id = $1 AND deleted_at IS NULL{locking}",
        people.table
    );
    match executor.query_opt(&sql, &[&id])? {
        Some(row) => Ok(BloodTypeRef(row.try_get(0)?)),
        None => Err(BankError::not_found(format!("{} {id}", people.noun))),
    }
}
