use crate::amount::Amount;
use crate::ids::{MilestoneId, PaymentId};
use thiserror::Error;

/// Shared error taxonomy for the escrow, milestone, and financing engines.
///
/// Validation and state-transition failures are detected before any
/// mutation; `Conflict` is the only variant callers (or the coordinator)
/// may retry; `System` means an atomic commit failed internally and the
/// ledger was left untouched.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Malformed or missing input; caller's fault, no state change.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Command not legal for the entity's current lifecycle state.
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A balance precondition does not hold.
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    /// Releasing would overdraw the gig's locked escrow.
    #[error("Insufficient locked funds: required {required}, locked {locked}")]
    InsufficientLockedFunds { required: Amount, locked: Amount },

    /// Collateral policy violation (stake too small, score too low).
    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral { required: String, available: String },

    /// Aggregate advances would exceed the per-gig borrowing cap.
    #[error("Exceeds borrowing cap: requested {requested}, cap {cap}")]
    ExceedsBorrowingCap { requested: Amount, cap: Amount },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic version mismatch; the whole command should be retried.
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    #[error("Payment {0} already withdrawn")]
    AlreadyWithdrawn(PaymentId),

    #[error("Milestone {0} already has a pending submission")]
    AlreadyPending(MilestoneId),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unexpected failure inside an atomic commit; no partial state was
    /// written.
    #[error("System error: {0}")]
    System(String),
}

pub type Result<T> = std::result::Result<T, MarketError>;

impl MarketError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Helper for the common FSM-violation case.
    pub fn invalid_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::InvalidStateTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}
