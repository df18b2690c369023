use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a blood request.
///
/// `Pending -> Fulfilled` and `Pending -> Cancelled` are the only transitions;
/// both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Fulfilled => "Fulfilled",
            RequestStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Decide what an amendment from `(self, current_units)` to
    /// `(new_status, new_units)` has to do.
    pub fn plan_amendment(
        self,
        current_units: i32,
        new_units: i32,
        new_status: RequestStatus,
    ) -> Result<AmendPlan, AmendRejection> {
        let unchanged = current_units == new_units && self == new_status;
        match self {
            RequestStatus::Fulfilled if unchanged => Ok(AmendPlan::NoOp),
            RequestStatus::Fulfilled => Err(AmendRejection::Immutable),
            RequestStatus::Cancelled if unchanged => Ok(AmendPlan::NoOp),
            RequestStatus::Cancelled => Err(AmendRejection::Transition {
                from: self,
                to: new_status,
            }),
            RequestStatus::Pending => Ok(match new_status {
                RequestStatus::Fulfilled => AmendPlan::Fulfill { units: new_units },
                RequestStatus::Cancelled => AmendPlan::Cancel { units: new_units },
                RequestStatus::Pending if unchanged => AmendPlan::NoOp,
                RequestStatus::Pending => AmendPlan::UpdateUnits { units: new_units },
            }),
        }
    }
}

/// What an accepted amendment does to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmendPlan {
    /// Identical values; nothing to write
    NoOp,
    /// Pending stays Pending with a new unit count; ledger untouched
    UpdateUnits { units: i32 },
    /// Debit `units` and mark Fulfilled
    Fulfill { units: i32 },
    /// Mark Cancelled; ledger untouched
    Cancel { units: i32 },
}

/// Why an amendment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmendRejection {
    Immutable,
    Transition {
        from: RequestStatus,
        to: RequestStatus,
    },
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "fulfilled" => Ok(RequestStatus::Fulfilled),
            "cancelled" | "canceled" => Ok(RequestStatus::Cancelled),
            other => Err(format!("unknown request status '{other}'")),
        }
    }
}
