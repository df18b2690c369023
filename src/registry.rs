//! Lookup registry for the blood-type dimension.
//!
//! Labels live in `blood_types(id, label UNIQUE)`. Refs are handed out the
//! first time a label is seen and never change afterwards.

use crate::error::{BankError, BankResult};
use crate::executor::{SqlExecutor, StoreError};
use crate::model::{BloodTypeLabel, BloodTypeRef};

pub struct Registry<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> Registry<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Return the ref for `raw`, registering the label if it is new.
    ///
    /// Concurrent callers registering the same label converge on one row:
    /// the insert is a no-op on conflict and the row is then re-read.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank label, `Storage` on database failure.
    pub fn resolve_or_create(&self, raw: &str) -> BankResult<BloodTypeRef> {
        let label = BloodTypeLabel::parse(raw)?;
        self.resolve_or_create_label(&label)
    }

    pub(crate) fn resolve_or_create_label(&self, label: &BloodTypeLabel) -> BankResult<BloodTypeRef> {
        if let Some(existing) = self.lookup(label)? {
            return Ok(existing);
        }

        let inserted = self.executor.query_opt(
            "INSERT INTO blood_types (label) VALUES ($1) ON CONFLICT (label) DO NOTHING RETURNING id",
            &[&label.as_str()],
        )?;
        if let Some(row) = inserted {
            let id = BloodTypeRef(row.try_get(0)?);
            if !label.is_standard() && !label.is_unknown() {
                log::warn!("registered non-standard blood type '{label}' as {id}");
            } else {
                log::info!("registered blood type '{label}' as {id}");
            }
            return Ok(id);
        }

        // Lost the race to another writer; its row is visible now.
        self.lookup(label)?.ok_or_else(|| {
            BankError::Storage(StoreError::QueryError(format!(
                "blood type '{label}' vanished after conflicting insert"
            )))
        })
    }

    /// Read-only lookup.
    ///
    /// # Errors
    ///
    /// `NotFound` when the label was never registered.
    pub fn resolve(&self, raw: &str) -> BankResult<BloodTypeRef> {
        let label = BloodTypeLabel::parse(raw)?;
        self.lookup(&label)?
            .ok_or_else(|| BankError::not_found(format!("blood type '{label}'")))
    }

    /// Reverse lookup from ref to label.
    pub fn label_of(&self, blood_type: BloodTypeRef) -> BankResult<BloodTypeLabel> {
        let row = self.executor.query_opt(
            "SELECT label FROM blood_types WHERE id = $1",
            &[&blood_type.id()],
        )?;
        match row {
            Some(row) => Ok(BloodTypeLabel::from_stored(row.try_get(0)?)),
            None => Err(BankError::not_found(format!("blood type {blood_type}"))),
        }
    }

    /// All registered blood types, ordered by label.
    pub fn list(&self) -> BankResult<Vec<(BloodTypeRef, BloodTypeLabel)>> {
        let rows = self
            .executor
            .query_all("SELECT id, label FROM blood_types ORDER BY label", &[])?;
        rows.iter()
            .map(|row| -> BankResult<_> {
                Ok((
                    BloodTypeRef(row.try_get(0)?),
                    BloodTypeLabel::from_stored(row.try_get(1)?),
                ))
            })
            .collect()
    }

    fn lookup(&self, label: &BloodTypeLabel) -> BankResult<Option<BloodTypeRef>> {
        let row = self.executor.query_opt(
            "SELECT id FROM blood_types WHERE label = $1",
            &[&label.as_str()],
        )?;
        Ok(match row {
            Some(row) => Some(BloodTypeRef(row.try_get(0)?)),
            None => None,
        })
    }
}
