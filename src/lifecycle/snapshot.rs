//! Read side: active records, newest first, plus inventory by label.

use crate::error::BankResult;
use crate::executor::{SqlExecutor, StoreError};
use crate::ledger::Ledger;
use crate::model::{Donation, Donor, Recipient, Request, Snapshot};
use may_postgres::Row;

const DONORS: &str = "SELECT d.id, d.name, bt.label, d.phone, d.city, d.created_at \
     FROM donors d JOIN blood_types bt ON bt.id = d.blood_type_id \
     WHERE d.deleted_at IS NULL ORDER BY d.id DESC";

const RECIPIENTS: &str = "SELECT r.id, r.name, bt.label, r.phone, r.hospital, r.created_at \
     FROM recipients r JOIN blood_types bt ON bt.id = r.blood_type_id \
     WHERE r.deleted_at IS NULL ORDER BY r.id DESC";

const DONATIONS: &str = "SELECT d.id, d.donor_id, dn.name, bt.label, d.units, d.donation_date, d.expiry_date \
     FROM donations d \
     JOIN donors dn ON dn.id = d.donor_id \
     JOIN blood_types bt ON bt.id = dn.blood_type_id \
     WHERE d.deleted_at IS NULL ORDER BY d.id DESC";

const REQUESTS: &str = "SELECT r.id, r.recipient_id, rc.name, bt.label, r.units, r.status, r.request_date \
     FROM requests r \
     JOIN recipients rc ON rc.id = r.recipient_id \
     JOIN blood_types bt ON bt.id = rc.blood_type_id \
     WHERE r.deleted_at IS NULL ORDER BY r.id DESC";

pub fn snapshot(executor: &dyn SqlExecutor) -> BankResult<Snapshot> {
    Ok(Snapshot {
        donors: load(executor, DONORS, Donor::from_row)?,
        recipients: load(executor, RECIPIENTS, Recipient::from_row)?,
        donations: load(executor, DONATIONS, Donation::from_row)?,
        inventory: Ledger::new(executor).balances()?,
        requests: load(executor, REQUESTS, Request::from_row)?,
    })
}

fn load<T>(
    executor: &dyn SqlExecutor,
    sql: &str,
    from_row: fn(&Row) -> Result<T, StoreError>,
) -> BankResult<Vec<T>> {
    let rows = executor.query_all(sql, &[])?;
    Ok(rows.iter().map(from_row).collect::<Result<Vec<_>, _>>()?)
}
