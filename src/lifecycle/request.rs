//! Request state machine.
//!
//! Only the transition into `Fulfilled` touches the ledger. Cancelled
//! requests are soft-deleted at the same time, so they drop out of listings
//! but still answer transition checks.

use super::people::recipient_blood_type;
use crate::error::{BankError, BankResult};
use crate::executor::{SqlExecutor, StoreError};
use crate::ledger::Ledger;
use crate::model::{AmendPlan, AmendRejection, BloodTypeRef, RecipientId, RequestId, RequestStatus};

#[derive(Debug)]
struct RequestState {
    blood_type: BloodTypeRef,
    units: i32,
    status: RequestStatus,
}

/// Open a Pending request dated today.
pub fn create_request(
    executor: &dyn SqlExecutor,
    recipient_id: RecipientId,
    units: i32,
) -> BankResult<RequestId> {
    if units <= 0 {
        return Err(BankError::invalid("request units must be greater than zero"));
    }
    recipient_blood_type(executor, recipient_id)?;

    let row = executor.query_one(
        "INSERT INTO requests (recipient_id, units, status, request_date) \
         VALUES ($1, $2, $3, CURRENT_DATE) RETURNING id",
        &[&recipient_id, &units, &RequestStatus::Pending.as_str()],
    )?;
    let id: RequestId = row.try_get(0)?;
    log::info!("opened request {id}: {units} unit(s) for recipient {recipient_id}");
    Ok(id)
}

/// Debit the request's units and mark it Fulfilled.
///
/// # Errors
///
/// * `ImmutableFulfilledRequest` when already fulfilled
/// * `InvalidTransition` when cancelled
/// * `InsufficientInventory` when the balance is short; status unchanged
pub fn fulfill(executor: &dyn SqlExecutor, request_id: RequestId) -> BankResult<()> {
    let state = load(executor, request_id)?;
    match state.status {
        RequestStatus::Pending => {}
        RequestStatus::Fulfilled => {
            return Err(BankError::ImmutableFulfilledRequest { request_id })
        }
        RequestStatus::Cancelled => {
            return Err(BankError::InvalidTransition {
                request_id,
                from: state.status,
                to: RequestStatus::Fulfilled,
            })
        }
    }
    consume(executor, request_id, state.blood_type, state.units)?;
    executor.execute(
        "UPDATE requests SET status = $2 WHERE id = $1",
        &[&request_id, &RequestStatus::Fulfilled.as_str()],
    )?;
    log::info!("fulfilled request {request_id} ({} unit(s))", state.units);
    Ok(())
}

/// Change units and status in one step.
///
/// A fulfilled request only accepts its current values back, as a no-op.
pub fn amend(
    executor: &dyn SqlExecutor,
    request_id: RequestId,
    new_units: i32,
    new_status: RequestStatus,
) -> BankResult<()> {
    if new_units <= 0 {
        return Err(BankError::invalid("request units must be greater than zero"));
    }
    let state = load(executor, request_id)?;
    let plan = state
        .status
        .plan_amendment(state.units, new_units, new_status)
        .map_err(|rejection| match rejection {
            AmendRejection::Immutable => BankError::ImmutableFulfilledRequest { request_id },
            AmendRejection::Transition { from, to } => BankError::InvalidTransition {
                request_id,
                from,
                to,
            },
        })?;

    match plan {
        AmendPlan::NoOp => {}
        AmendPlan::UpdateUnits { units } => {
            executor.execute(
                "UPDATE requests SET units = $2 WHERE id = $1",
                &[&request_id, &units],
            )?;
        }
        AmendPlan::Fulfill { units } => {
            consume(executor, request_id, state.blood_type, units)?;
            executor.execute(
                "UPDATE requests SET units = $2, status = $3 WHERE id = $1",
                &[&request_id, &units, &RequestStatus::Fulfilled.as_str()],
            )?;
        }
        AmendPlan::Cancel { units } => {
            executor.execute(
                "UPDATE requests SET units = $2, status = $3, deleted_at = NOW() WHERE id = $1",
                &[&request_id, &units, &RequestStatus::Cancelled.as_str()],
            )?;
        }
    }
    log::debug!("amended request {request_id}: {plan:?}");
    Ok(())
}

/// Cancel a Pending request. The ledger is never touched.
pub fn cancel(executor: &dyn SqlExecutor, request_id: RequestId) -> BankResult<()> {
    let state = load(executor, request_id)?;
    match state.status {
        RequestStatus::Pending => {}
        RequestStatus::Fulfilled => {
            return Err(BankError::ImmutableFulfilledRequest { request_id })
        }
        RequestStatus::Cancelled => {
            return Err(BankError::InvalidTransition {
                request_id,
                from: state.status,
                to: RequestStatus::Cancelled,
            })
        }
    }
    executor.execute(
        "UPDATE requests SET status = $2, deleted_at = NOW() WHERE id = $1",
        &[&request_id, &RequestStatus::Cancelled.as_str()],
    )?;
    log::info!("cancelled request {request_id}");
    Ok(())
}

fn consume(
    executor: &dyn SqlExecutor,
    request_id: RequestId,
    blood_type: BloodTypeRef,
    units: i32,
) -> BankResult<()> {
    if Ledger::new(executor).debit(blood_type, units)? {
        Ok(())
    } else {
        log::info!("request {request_id} refused: {units} unit(s) of {blood_type} not on hand");
        Err(BankError::InsufficientInventory {
            blood_type_id: blood_type.id(),
            requested: units,
        })
    }
}

/// Lock the request row and read what the state machine needs. The
/// recipient row is share-locked so its blood type cannot change under a
/// fulfilment. Cancelled requests are included so transition errors can name
/// them.
fn load(executor: &dyn SqlExecutor, request_id: RequestId) -> BankResult<RequestState> {
    let row = executor
        .query_opt(
            "SELECT rc.blood_type_id, r.units, r.status \
             FROM requests r JOIN recipients rc ON rc.id = r.recipient_id \
             WHERE r.id = $1 \
             FOR UPDATE OF r FOR SHARE OF rc",
            &[&request_id],
        )?
        .ok_or_else(|| BankError::not_found(format!("request {request_id}")))?;
    let status: String = row.try_get(2)?;
    Ok(RequestState {
        blood_type: BloodTypeRef(row.try_get(0)?),
        units: row.try_get(1)?,
        status: status.parse().map_err(|e: String| {
            BankError::Storage(StoreError::ParseError(format!("request {request_id}: {e}")))
        })?,
    })
}
