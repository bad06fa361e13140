use serde::{Deserialize, Serialize};

/// Lifecycle contract implemented by every status enum.
///
/// Engines never assign statuses directly; they go through
/// `can_transition_to` so an illegal edge surfaces as
/// `MarketError::InvalidStateTransition` instead of corrupting the ledger.
pub trait LifecycleState: Clone + std::fmt::Debug {
    fn is_terminal(&self) -> bool;
    fn can_transition_to(&self, next: &Self) -> bool;
}

/// Gig lifecycle status.
///
/// Transitions are monotonic along
/// `draft → open → assigned → in_progress → completed`, with
/// `in_progress ↔ milestone_submitted` toggling while reviews happen and
/// `cancelled` absorbing from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GigStatus {
    Draft,
    Open,
    Assigned,
    InProgress,
    MilestoneSubmitted,
    Completed,
    Cancelled,
}

impl LifecycleState for GigStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use GigStatus::*;
        if self.is_terminal() {
            return false;
        }
        // Cancellation is absorbing from any non-terminal state
        if matches!(next, Cancelled) {
            return true;
        }
        match (self, next) {
            (Draft, Open) => true,
            (Open, Assigned) => true,
            (Assigned, InProgress) => true,
            (Assigned, MilestoneSubmitted) => true,
            (InProgress, MilestoneSubmitted) => true,
            // After a review the gig drops back to in_progress
            (MilestoneSubmitted, InProgress) => true,
            (MilestoneSubmitted, Completed) => true,
            (InProgress, Completed) => true,
            _ => false,
        }
    }
}

/// Escrow funding status of a gig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    NotDeposited,
    Deposited,
    PartiallyReleased,
    Released,
}

impl LifecycleState for EscrowStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Released)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use EscrowStatus::*;
        matches!(
            (self, next),
            (NotDeposited, Deposited)
                | (Deposited, PartiallyReleased)
                | (Deposited, Released)
                | (PartiallyReleased, Released)
        )
    }
}

/// Milestone lifecycle.
///
/// `rejected` allows resubmission (either by moving back to work or by
/// submitting directly); `released` is only ever driven by the escrow
/// engine from `approved`, never by a user command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Submitted,
    Approved,
    Rejected,
    Released,
}

impl LifecycleState for MilestoneStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Released)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use MilestoneStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Submitted)
                | (InProgress, Submitted)
                | (Submitted, Approved)
                | (Submitted, Rejected)
                | (Rejected, InProgress)
                | (Rejected, Submitted)
                | (Approved, Released)
        )
    }
}

/// Payment record lifecycle: strictly forward, no backward edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Locked,
    PendingRelease,
    Released,
    Withdrawn,
}

impl LifecycleState for PaymentStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Withdrawn)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Locked, PendingRelease)
                | (Locked, Released)
                | (PendingRelease, Released)
                | (Released, Withdrawn)
        )
    }
}

/// Advance-loan lifecycle. Overdue is a read-side predicate on
/// `due_date`, not a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    Disbursed,
    Repaying,
    Repaid,
    Defaulted,
    Rejected,
}

impl LoanStatus {
    /// Loans that still owe money and participate in repayment waterfalls.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Disbursed | Self::Repaying)
    }

    /// Loans counted against a gig's aggregate borrowing cap.
    pub fn counts_against_cap(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Approved | Self::Disbursed | Self::Repaying
        )
    }
}

impl LifecycleState for LoanStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Repaid | Self::Defaulted | Self::Rejected)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Disbursed)
                | (Approved, Rejected)
                | (Disbursed, Repaying)
                | (Disbursed, Repaid)
                | (Disbursed, Defaulted)
                | (Repaying, Repaid)
                | (Repaying, Defaulted)
        )
    }
}
