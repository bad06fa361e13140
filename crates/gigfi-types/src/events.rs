use crate::amount::Amount;
use crate::ids::{GigId, LoanId, MilestoneId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

/// Domain events emitted after a successful commit.
///
/// Delivery is external: the coordinator hands these to whatever
/// notification collaborator subscribes, and never waits on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DomainEvent {
    GigPosted {
        gig_id: GigId,
        employer: UserId,
        payment_amount: Amount,
    },
    EscrowDeposited {
        gig_id: GigId,
        amount: Amount,
    },
    WorkerAssigned {
        gig_id: GigId,
        worker: UserId,
    },
    MilestoneSubmitted {
        gig_id: GigId,
        milestone_id: MilestoneId,
        worker: UserId,
    },
    MilestoneReviewed {
        gig_id: GigId,
        milestone_id: MilestoneId,
        approved: bool,
    },
    EscrowReleased {
        gig_id: GigId,
        milestone_id: MilestoneId,
        amount: Amount,
        net_payable: Amount,
    },
    PaymentWithdrawn {
        gig_id: GigId,
        payment_id: PaymentId,
        amount: Amount,
        receipt: String,
    },
    GigCompleted {
        gig_id: GigId,
    },
    GigCancelled {
        gig_id: GigId,
        refunded: Amount,
    },
    AdvanceRequested {
        gig_id: GigId,
        loan_id: LoanId,
        worker: UserId,
        amount: Amount,
    },
    AdvanceDisbursed {
        gig_id: GigId,
        loan_id: LoanId,
        amount: Amount,
    },
    LoanRepaid {
        gig_id: GigId,
        loan_id: LoanId,
        amount: Amount,
        settled: bool,
    },
    LoanDefaulted {
        loan_id: LoanId,
    },
    WorkerRated {
        gig_id: GigId,
        worker: UserId,
        score: u8,
    },
}
