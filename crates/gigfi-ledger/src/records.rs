use chrono::{DateTime, Utc};
use gigfi_types::{
    Amount, CollateralId, CollateralKind, EscrowStatus, GigId, GigStatus, LifecycleState, LoanId,
    LoanStatus, MarketError, MilestoneId, MilestoneStatus, PaymentId, PaymentStatus, UserId,
};
use serde::{Deserialize, Serialize};

/// A unit of work posted by an employer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GigRecord {
    pub id: GigId,
    pub employer: UserId,
    /// Unset until a worker is assigned.
    pub worker: Option<UserId>,
    pub title: String,
    pub payment_amount: Amount,
    pub escrow_status: EscrowStatus,
    pub status: GigStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GigRecord {
    pub fn transition_to(&mut self, next: GigStatus) -> gigfi_types::Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(MarketError::invalid_transition(self.status, next));
        }
        tracing::debug!(gig_id = %self.id, from = ?self.status, to = ?next, "Gig state transition");
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn escrow_transition_to(&mut self, next: EscrowStatus) -> gigfi_types::Result<()> {
        if !self.escrow_status.can_transition_to(&next) {
            return Err(MarketError::invalid_transition(self.escrow_status, next));
        }
        self.escrow_status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Escrow counters for one gig. Once deposited,
/// `locked + released == total` holds at all times and
/// `withdrawn <= released`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscrowBalance {
    pub total_amount: Amount,
    pub locked_amount: Amount,
    pub released_amount: Amount,
    pub withdrawn_amount: Amount,
}

/// Ordered deliverable unit belonging to exactly one gig.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub id: MilestoneId,
    pub gig_id: GigId,
    /// Unique per gig; drives the "next milestone" ordering.
    pub order_index: u32,
    pub description: String,
    pub amount: Amount,
    /// Share of the gig payment, must sum to 100 across the gig.
    pub payment_percentage: u8,
    pub status: MilestoneStatus,
    pub submission_note: Option<String>,
    pub submission_url: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub review_comments: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MilestoneRecord {
    pub fn transition_to(&mut self, next: MilestoneStatus) -> gigfi_types::Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(MarketError::invalid_transition(self.status, next));
        }
        tracing::debug!(
            milestone_id = %self.id,
            gig_id = %self.gig_id,
            from = ?self.status,
            to = ?next,
            "Milestone state transition"
        );
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Immutable record of one escrow-release event. The amount never
/// changes after creation; only the status moves forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub gig_id: GigId,
    /// Set for milestone releases, unset for cancellation refunds.
    pub milestone_id: Option<MilestoneId>,
    pub payee: UserId,
    pub amount: Amount,
    pub status: PaymentStatus,
    /// Hex-encoded withdrawal receipt hash, set when withdrawn.
    pub receipt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn transition_to(&mut self, next: PaymentStatus) -> gigfi_types::Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(MarketError::invalid_transition(self.status, next));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A worker's advance against a gig's future escrow releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRecord {
    pub id: LoanId,
    pub gig_id: GigId,
    pub worker: UserId,
    pub requested_amount: Amount,
    pub approved_amount: Amount,
    pub interest_rate_bps: u32,
    pub collateral_kind: CollateralKind,
    /// Reference, not ownership: the asset outlives the loan.
    pub collateral_id: Option<CollateralId>,
    /// How much of the referenced asset this loan locked at disbursement.
    pub collateral_locked: Amount,
    pub status: LoanStatus,
    /// Principal plus interest.
    pub total_due: Amount,
    pub total_repaid: Amount,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanRecord {
    pub fn transition_to(&mut self, next: LoanStatus) -> gigfi_types::Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(MarketError::invalid_transition(self.status, next));
        }
        tracing::debug!(loan_id = %self.id, from = ?self.status, to = ?next, "Loan state transition");
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn outstanding_due(&self) -> Amount {
        self.total_due.saturating_sub(self.total_repaid)
    }

    /// Business deadline only; surfaces on reads, never triggers
    /// background cancellation.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_outstanding() && now > self.due_date
    }
}

/// Collateral asset backing one or more loans (endorsement stake,
/// reputation stake). `locked_amount <= asset_value` always.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralRecord {
    pub id: CollateralId,
    pub owner: UserId,
    pub kind: CollateralKind,
    pub asset_value: Amount,
    pub locked_amount: Amount,
    /// Optimistic concurrency version, bumped by the store on every
    /// accepted update. Collateral is shared across gigs, so lock
    /// changes need their own stale-write guard.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollateralRecord {
    pub fn available(&self) -> Amount {
        self.asset_value.saturating_sub(self.locked_amount)
    }
}

/// One employer rating of a worker on a completed gig. The average of
/// these (scaled by 100) is the numeric reputation input the financing
/// engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRecord {
    pub gig_id: GigId,
    pub worker: UserId,
    pub employer: UserId,
    /// 1..=5
    pub score: u8,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The complete row set for one gig: the unit of transactional commit.
///
/// Engines load a snapshot, mutate it, and commit it back once; the
/// store rejects the commit if the version moved underneath them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GigLedger {
    pub gig: GigRecord,
    pub escrow: EscrowBalance,
    pub milestones: Vec<MilestoneRecord>,
    pub payments: Vec<PaymentRecord>,
    pub loans: Vec<LoanRecord>,
    /// Optimistic version, bumped on every commit.
    pub version: u64,
}

impl GigLedger {
    pub fn new(gig: GigRecord, milestones: Vec<MilestoneRecord>) -> Self {
        Self {
            gig,
            escrow: EscrowBalance::default(),
            milestones,
            payments: Vec::new(),
            loans: Vec::new(),
            version: 0,
        }
    }

    pub fn milestone(&self, id: MilestoneId) -> Option<&MilestoneRecord> {
        self.milestones.iter().find(|m| m.id == id)
    }

    pub fn milestone_mut(&mut self, id: MilestoneId) -> Option<&mut MilestoneRecord> {
        self.milestones.iter_mut().find(|m| m.id == id)
    }

    pub fn payment(&self, id: PaymentId) -> Option<&PaymentRecord> {
        self.payments.iter().find(|p| p.id == id)
    }

    pub fn payment_mut(&mut self, id: PaymentId) -> Option<&mut PaymentRecord> {
        self.payments.iter_mut().find(|p| p.id == id)
    }

    pub fn loan(&self, id: LoanId) -> Option<&LoanRecord> {
        self.loans.iter().find(|l| l.id == id)
    }

    pub fn loan_mut(&mut self, id: LoanId) -> Option<&mut LoanRecord> {
        self.loans.iter_mut().find(|l| l.id == id)
    }

    /// Lowest-order milestone still actionable by the worker, or `None`
    /// when the gig has no actionable next step.
    pub fn next_milestone(&self) -> Option<&MilestoneRecord> {
        self.milestones
            .iter()
            .filter(|m| {
                matches!(
                    m.status,
                    MilestoneStatus::Pending | MilestoneStatus::InProgress
                )
            })
            .min_by_key(|m| m.order_index)
    }

    pub fn all_milestones_released(&self) -> bool {
        self.milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::Released)
    }

    /// Share of the payment already released, as a percentage.
    pub fn progress_percent(&self) -> u8 {
        self.milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Released)
            .map(|m| m.payment_percentage)
            .sum()
    }

    /// Principal still counted against the gig's borrowing cap.
    pub fn outstanding_principal(&self) -> Amount {
        self.loans
            .iter()
            .filter(|l| l.status.counts_against_cap())
            .fold(Amount::ZERO, |acc, l| {
                acc.saturating_add(l.approved_amount)
            })
    }

    pub fn total_repaid(&self) -> Amount {
        self.loans
            .iter()
            .fold(Amount::ZERO, |acc, l| acc.saturating_add(l.total_repaid))
    }

    /// Audit every ledger invariant. The balance counters are mutable
    /// state, but they must always be recomputable from the immutable
    /// payment and loan rows; a mismatch means a torn write happened.
    pub fn verify(&self) -> std::result::Result<(), String> {
        let milestone_sum = self
            .milestones
            .iter()
            .fold(Amount::ZERO, |acc, m| acc.saturating_add(m.amount));
        if milestone_sum != self.gig.payment_amount {
            return Err(format!(
                "milestone amounts {} != gig payment {}",
                milestone_sum, self.gig.payment_amount
            ));
        }

        let pct_sum: u32 = self
            .milestones
            .iter()
            .map(|m| m.payment_percentage as u32)
            .sum();
        if pct_sum != 100 {
            return Err(format!("milestone percentages sum to {}", pct_sum));
        }

        if self.gig.escrow_status != EscrowStatus::NotDeposited {
            if self.escrow.total_amount != self.gig.payment_amount {
                return Err(format!(
                    "escrow total {} != gig payment {}",
                    self.escrow.total_amount, self.gig.payment_amount
                ));
            }
            let sum = self
                .escrow
                .locked_amount
                .saturating_add(self.escrow.released_amount);
            if sum != self.escrow.total_amount {
                return Err(format!(
                    "locked {} + released {} != total {}",
                    self.escrow.locked_amount,
                    self.escrow.released_amount,
                    self.escrow.total_amount
                ));
            }
        }

        if self.escrow.withdrawn_amount > self.escrow.released_amount {
            return Err(format!(
                "withdrawn {} > released {}",
                self.escrow.withdrawn_amount, self.escrow.released_amount
            ));
        }

        // Every released unit is either a payment row or a loan repayment
        let payment_sum = self
            .payments
            .iter()
            .fold(Amount::ZERO, |acc, p| acc.saturating_add(p.amount));
        if payment_sum.saturating_add(self.total_repaid()) != self.escrow.released_amount {
            return Err(format!(
                "payments {} + repayments {} != released {}",
                payment_sum,
                self.total_repaid(),
                self.escrow.released_amount
            ));
        }

        for loan in &self.loans {
            if loan.total_repaid > loan.total_due {
                return Err(format!(
                    "loan {} repaid {} > due {}",
                    loan.id, loan.total_repaid, loan.total_due
                ));
            }
            if loan.status == LoanStatus::Repaid && loan.total_repaid != loan.total_due {
                return Err(format!("loan {} marked repaid while owing", loan.id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gig() -> GigLedger {
        let now = Utc::now();
        let gig = GigRecord {
            id: GigId::new(1),
            employer: UserId::new(10),
            worker: None,
            title: "Build a landing page".into(),
            payment_amount: Amount::from_tokens(1000),
            escrow_status: EscrowStatus::NotDeposited,
            status: GigStatus::Open,
            created_at: now,
            updated_at: now,
        };
        let milestones = vec![
            MilestoneRecord {
                id: MilestoneId::new(2),
                gig_id: GigId::new(1),
                order_index: 0,
                description: "Design".into(),
                amount: Amount::from_tokens(600),
                payment_percentage: 60,
                status: MilestoneStatus::Pending,
                submission_note: None,
                submission_url: None,
                submitted_at: None,
                review_comments: None,
                reviewed_at: None,
                created_at: now,
                updated_at: now,
            },
            MilestoneRecord {
                id: MilestoneId::new(3),
                gig_id: GigId::new(1),
                order_index: 1,
                description: "Implementation".into(),
                amount: Amount::from_tokens(400),
                payment_percentage: 40,
                status: MilestoneStatus::Pending,
                submission_note: None,
                submission_url: None,
                submitted_at: None,
                review_comments: None,
                reviewed_at: None,
                created_at: now,
                updated_at: now,
            },
        ];
        GigLedger::new(gig, milestones)
    }

    #[test]
    fn test_next_milestone_is_lowest_order() {
        let mut ledger = test_gig();
        assert_eq!(ledger.next_milestone().unwrap().order_index, 0);

        ledger.milestones[0].status = MilestoneStatus::Released;
        assert_eq!(ledger.next_milestone().unwrap().order_index, 1);

        ledger.milestones[1].status = MilestoneStatus::Submitted;
        assert!(ledger.next_milestone().is_none());
    }

    #[test]
    fn test_verify_accepts_consistent_ledger() {
        let ledger = test_gig();
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_verify_rejects_broken_escrow_sum() {
        let mut ledger = test_gig();
        ledger.gig.escrow_status = EscrowStatus::Deposited;
        ledger.escrow.total_amount = Amount::from_tokens(1000);
        ledger.escrow.locked_amount = Amount::from_tokens(999);
        ledger.escrow.released_amount = Amount::ZERO;
        assert!(ledger.verify().is_err());
    }

    #[test]
    fn test_verify_rejects_bad_milestone_sum() {
        let mut ledger = test_gig();
        ledger.milestones[0].amount = Amount::from_tokens(500);
        assert!(ledger.verify().is_err());
    }

    #[test]
    fn test_transition_rejects_illegal_edge() {
        let mut ledger = test_gig();
        let m = ledger.milestone_mut(MilestoneId::new(2)).unwrap();
        assert!(m.transition_to(MilestoneStatus::Approved).is_err());
        assert!(m.transition_to(MilestoneStatus::Submitted).is_ok());
        assert!(m.transition_to(MilestoneStatus::Approved).is_ok());
    }

    #[test]
    fn test_progress_tracks_released_percentage() {
        let mut ledger = test_gig();
        assert_eq!(ledger.progress_percent(), 0);
        ledger.milestones[0].status = MilestoneStatus::Released;
        assert_eq!(ledger.progress_percent(), 60);
        ledger.milestones[1].status = MilestoneStatus::Released;
        assert_eq!(ledger.progress_percent(), 100);
        assert!(ledger.all_milestones_released());
    }
}
