//! Inventory ledger: one running balance per blood type.
//!
//! Balances change only through [`Ledger::credit`] and [`Ledger::debit`].
//! A debit is a single conditional `UPDATE`; PostgreSQL's row lock orders
//! concurrent debits on the same blood type and the `units >= $2` predicate is
//! re-checked against the latest committed balance, so the balance cannot go
//! negative no matter how many callers race.

use crate::error::{BankError, BankResult};
use crate::executor::SqlExecutor;
use crate::model::{BloodTypeRef, Discrepancy, InventoryLine};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

pub struct Ledger<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> Ledger<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Add `units` to the balance of `blood_type`, creating the row on first use.
    ///
    /// A logically removed row is revived by the credit.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `units <= 0`; `Storage` otherwise.
    pub fn credit(&self, blood_type: BloodTypeRef, units: i32) -> BankResult<()> {
        check_units(units)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::ledger_span("credit", blood_type.id(), units).entered();

        self.executor.execute(
            "INSERT INTO inventory (blood_type_id, units, deleted_at) VALUES ($1, $2, NULL) \
             ON CONFLICT (blood_type_id) DO UPDATE SET \
             units = inventory.units + EXCLUDED.units, deleted_at = NULL",
            &[&blood_type.id(), &units],
        )?;

        #[cfg(feature = "metrics")]
        METRICS.record_credit(blood_type.id(), units);
        log::debug!("credited {units} unit(s) to blood type {blood_type}");
        Ok(())
    }

    /// Take `units` from the balance of `blood_type` if enough is on hand.
    ///
    /// Returns `false` without touching anything when the balance is short or
    /// the blood type has no active inventory row.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `units <= 0`; `Storage` otherwise.
    pub fn debit(&self, blood_type: BloodTypeRef, units: i32) -> BankResult<bool> {
        check_units(units)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::ledger_span("debit", blood_type.id(), units).entered();

        let affected = self.executor.execute(
            "UPDATE inventory SET units = units - $2 \
             WHERE blood_type_id = $1 AND deleted_at IS NULL AND units >= $2",
            &[&blood_type.id(), &units],
        )?;
        let applied = affected == 1;

        #[cfg(feature = "metrics")]
        METRICS.record_debit(blood_type.id(), units, applied);
        if applied {
            log::debug!("debited {units} unit(s) from blood type {blood_type}");
        } else {
            log::debug!("debit of {units} unit(s) from blood type {blood_type} refused");
        }
        Ok(applied)
    }

    /// Mark the balance row of `blood_type` removed once no active donation
    /// backs it any more. The row stays in place for the next credit.
    pub fn retire_if_reversed(&self, blood_type: BloodTypeRef) -> BankResult<bool> {
        let affected = self.executor.execute(
            "UPDATE inventory SET deleted_at = NOW() \
             WHERE blood_type_id = $1 AND deleted_at IS NULL AND units = 0 \
               AND NOT EXISTS ( \
                 SELECT 1 FROM donations d JOIN donors dn ON dn.id = d.donor_id \
                 WHERE dn.blood_type_id = $1 AND d.deleted_at IS NULL)",
            &[&blood_type.id()],
        )?;
        Ok(affected == 1)
    }

    /// Current balance; zero when there is no active row.
    pub fn balance(&self, blood_type: BloodTypeRef) -> BankResult<i32> {
        let row = self.executor.query_opt(
            "SELECT units FROM inventory WHERE blood_type_id = $1 AND deleted_at IS NULL",
            &[&blood_type.id()],
        )?;
        Ok(match row {
            Some(row) => row.try_get(0)?,
            None => 0,
        })
    }

    /// Active balances ordered by label.
    pub fn balances(&self) -> BankResult<Vec<InventoryLine>> {
        let rows = self.executor.query_all(
            "SELECT bt.label, i.units \
             FROM inventory i JOIN blood_types bt ON bt.id = i.blood_type_id \
             WHERE i.deleted_at IS NULL \
             ORDER BY bt.label",
            &[],
        )?;
        rows.iter()
            .map(|row| -> BankResult<_> {
                Ok(InventoryLine {
                    blood_type: row.try_get(0)?,
                    units: row.try_get(1)?,
                })
            })
            .collect()
    }

    /// Recompute every balance from active donations and fulfilled requests
    /// and report the blood types whose stored balance disagrees.
    pub fn reconcile(&self) -> BankResult<Vec<Discrepancy>> {
        let rows = self.executor.query_all(
            "SELECT bt.id, bt.label, \
               COALESCE((SELECT i.units FROM inventory i \
                         WHERE i.blood_type_id = bt.id AND i.deleted_at IS NULL), 0)::BIGINT, \
               COALESCE((SELECT SUM(d.units) FROM donations d JOIN donors dn ON dn.id = d.donor_id \
                         WHERE dn.blood_type_id = bt.id AND d.deleted_at IS NULL), 0)::BIGINT, \
               COALESCE((SELECT SUM(r.units) FROM requests r JOIN recipients rc ON rc.id = r.recipient_id \
                         WHERE rc.blood_type_id = bt.id AND r.status = 'Fulfilled'), 0)::BIGINT \
             FROM blood_types bt ORDER BY bt.label",
            &[],
        )?;
        let audits = rows
            .iter()
            .map(|row| -> BankResult<_> {
                Ok(BalanceAudit {
                    blood_type_id: row.try_get(0)?,
                    blood_type: row.try_get(1)?,
                    stored: row.try_get(2)?,
                    credited: row.try_get(3)?,
                    consumed: row.try_get(4)?,
                })
            })
            .collect::<BankResult<Vec<_>>>()?;
        Ok(find_discrepancies(audits))
    }
}

fn check_units(units: i32) -> BankResult<()> {
    if units <= 0 {
        return Err(BankError::invalid(format!(
            "units must be greater than zero, got {units}"
        )));
    }
    Ok(())
}

/// Stored balance next to the totals it should be derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BalanceAudit {
    blood_type_id: i64,
    blood_type: String,
    stored: i64,
    credited: i64,
    consumed: i64,
}

fn find_discrepancies(audits: Vec<BalanceAudit>) -> Vec<Discrepancy> {
    audits
        .into_iter()
        .filter_map(|audit| {
            let expected = audit.credited - audit.consumed;
            (audit.stored != expected).then(|| Discrepancy {
                blood_type_id: audit.blood_type_id,
                blood_type: audit.blood_type,
                stored: audit.stored,
                expected,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit(id: i64, label: &str, stored: i64, credited: i64, consumed: i64) -> BalanceAudit {
        BalanceAudit {
            blood_type_id: id,
            blood_type: label.to_string(),
            stored,
            credited,
            consumed,
        }
    }

    #[test]
    fn test_check_units() {
        assert!(check_units(1).is_ok());
        assert!(matches!(check_units(0), Err(BankError::InvalidArgument(_))));
        assert!(matches!(check_units(-3), Err(BankError::InvalidArgument(_))));
    }

    #[test]
    fn test_consistent_balances_report_nothing() {
        let audits = vec![
            audit(1, "A+", 3, 5, 2),
            audit(2, "O+", 0, 2, 2),
            audit(3, "UNKNOWN", 0, 0, 0),
        ];
        assert!(find_discrepancies(audits).is_empty());
    }

    #[test]
    fn test_drift_is_reported_with_expected_value() {
        let audits = vec![audit(1, "A+", 3, 5, 2), audit(2, "B-", 7, 4, 0)];
        let found = find_discrepancies(audits);
        assert_eq!(
            found,
            vec![Discrepancy {
                blood_type_id: 2,
                blood_type: "B-".to_string(),
                stored: 7,
                expected: 4,
            }]
        );
    }
}
