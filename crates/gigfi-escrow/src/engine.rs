use crate::hook::{LoanRepayment, ReleaseHook};
use chrono::Utc;
use gigfi_ledger::{GigLedger, GigRecord, LedgerStore, MilestoneRecord, PaymentRecord};
use gigfi_types::{
    Amount, EscrowStatus, GigId, GigStatus, MarketError, MilestoneId, MilestoneStatus, PaymentId,
    PaymentStatus, Result, UserId,
};
use std::sync::Arc;
use tracing::info;

/// Milestone definition supplied when posting a gig.
#[derive(Debug, Clone)]
pub struct MilestoneSpec {
    pub description: String,
    pub amount: Amount,
    pub payment_percentage: u8,
}

/// Proof of a completed withdrawal.
#[derive(Debug, Clone)]
pub struct WithdrawReceipt {
    pub payment_id: PaymentId,
    pub gig_id: GigId,
    pub payee: UserId,
    pub amount: Amount,
    /// Hex-encoded blake3 hash over the withdrawal parameters.
    pub receipt: String,
}

/// What a cancellation settled and refunded.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub gig_id: GigId,
    /// Net refund to the employer after loan repayments.
    pub refunded: Amount,
    /// Locked escrow that went to outstanding advances instead.
    pub repaid_total: Amount,
    pub repayments: Vec<LoanRepayment>,
    /// Set when a refund payment row was created (net refund > 0).
    pub refund_payment_id: Option<PaymentId>,
}

/// Owns the escrow balance of every gig and validates every
/// balance-changing operation. All mutations are validate-then-commit
/// against a snapshot; a failed validation leaves the ledger untouched.
pub struct EscrowEngine {
    store: Arc<dyn LedgerStore>,
    hook: Arc<dyn ReleaseHook>,
}

impl EscrowEngine {
    pub fn new(store: Arc<dyn LedgerStore>, hook: Arc<dyn ReleaseHook>) -> Self {
        Self { store, hook }
    }

    /// Create a gig with its milestone schedule. Fails fast when the
    /// schedule does not add up to the gig payment.
    pub async fn post_gig(
        &self,
        employer: UserId,
        title: &str,
        payment_amount: Amount,
        milestones: Vec<MilestoneSpec>,
    ) -> Result<GigId> {
        if title.trim().is_empty() {
            return Err(MarketError::Validation("gig title is empty".into()));
        }
        if payment_amount.is_zero() {
            return Err(MarketError::Validation("payment amount is zero".into()));
        }
        if milestones.is_empty() {
            return Err(MarketError::Validation(
                "a gig needs at least one milestone".into(),
            ));
        }
        let amount_sum = milestones
            .iter()
            .fold(Amount::ZERO, |acc, m| acc.saturating_add(m.amount));
        if amount_sum != payment_amount {
            return Err(MarketError::Validation(format!(
                "milestone amounts {} do not sum to payment {}",
                amount_sum, payment_amount
            )));
        }
        let pct_sum: u32 = milestones
            .iter()
            .map(|m| m.payment_percentage as u32)
            .sum();
        if pct_sum != 100 {
            return Err(MarketError::Validation(format!(
                "milestone percentages sum to {}, expected 100",
                pct_sum
            )));
        }
        if milestones.iter().any(|m| m.amount.is_zero()) {
            return Err(MarketError::Validation(
                "milestone amounts must be positive".into(),
            ));
        }

        let now = Utc::now();
        let gig_id = GigId::new(self.store.allocate_id().await);
        let gig = GigRecord {
            id: gig_id,
            employer,
            worker: None,
            title: title.to_string(),
            payment_amount,
            escrow_status: EscrowStatus::NotDeposited,
            status: GigStatus::Open,
            created_at: now,
            updated_at: now,
        };

        let mut records = Vec::with_capacity(milestones.len());
        for (index, spec) in milestones.into_iter().enumerate() {
            records.push(MilestoneRecord {
                id: MilestoneId::new(self.store.allocate_id().await),
                gig_id,
                order_index: index as u32,
                description: spec.description,
                amount: spec.amount,
                payment_percentage: spec.payment_percentage,
                status: MilestoneStatus::Pending,
                submission_note: None,
                submission_url: None,
                submitted_at: None,
                review_comments: None,
                reviewed_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        self.store
            .create_gig(GigLedger::new(gig, records))
            .await?;

        info!(
            gig_id = %gig_id,
            employer = %employer,
            payment = %payment_amount,
            "📋 Gig posted"
        );
        Ok(gig_id)
    }

    /// Fund the gig's escrow in full. Legal exactly once, and only for
    /// the exact gig payment amount.
    pub async fn deposit_escrow(&self, gig_id: GigId, caller: UserId, amount: Amount) -> Result<()> {
        let mut ledger = self.store.gig(gig_id).await?;

        if ledger.gig.employer != caller {
            return Err(MarketError::Unauthorized(format!(
                "only the employer may deposit escrow for gig {}",
                gig_id
            )));
        }
        if ledger.gig.escrow_status != EscrowStatus::NotDeposited {
            return Err(MarketError::invalid_transition(
                ledger.gig.escrow_status,
                EscrowStatus::Deposited,
            ));
        }
        if amount != ledger.gig.payment_amount {
            return Err(MarketError::Validation(format!(
                "deposit {} does not match gig payment {}",
                amount, ledger.gig.payment_amount
            )));
        }

        ledger.escrow.total_amount = amount;
        ledger.escrow.locked_amount = amount;
        ledger.gig.escrow_transition_to(EscrowStatus::Deposited)?;

        self.store.commit_gig(ledger, vec![]).await?;
        info!(gig_id = %gig_id, amount = %amount, "💰 Escrow deposited");
        Ok(())
    }

    /// Assign a worker to a funded gig.
    pub async fn assign_worker(&self, gig_id: GigId, caller: UserId, worker: UserId) -> Result<()> {
        let mut ledger = self.store.gig(gig_id).await?;

        if ledger.gig.employer != caller {
            return Err(MarketError::Unauthorized(format!(
                "only the employer may assign a worker to gig {}",
                gig_id
            )));
        }
        if worker == ledger.gig.employer {
            return Err(MarketError::Validation(
                "employer cannot be the worker of their own gig".into(),
            ));
        }
        if ledger.gig.escrow_status == EscrowStatus::NotDeposited {
            return Err(MarketError::Validation(
                "escrow must be deposited before a worker is assigned".into(),
            ));
        }

        ledger.gig.transition_to(GigStatus::Assigned)?;
        ledger.gig.worker = Some(worker);

        self.store.commit_gig(ledger, vec![]).await?;
        info!(gig_id = %gig_id, worker = %worker, "🤝 Worker assigned");
        Ok(())
    }

    /// Move a released payment to the caller's wallet. Idempotency is
    /// keyed on the payment id: a repeat call gets `AlreadyWithdrawn`
    /// and the counters move exactly once.
    pub async fn withdraw(
        &self,
        payment_id: PaymentId,
        caller: UserId,
        destination: &str,
    ) -> Result<WithdrawReceipt> {
        if destination.trim().is_empty() {
            return Err(MarketError::Validation(
                "withdrawal destination is empty".into(),
            ));
        }

        let gig_id = self.store.gig_id_for_payment(payment_id).await?;
        let mut ledger = self.store.gig(gig_id).await?;

        let payment = ledger
            .payment_mut(payment_id)
            .ok_or_else(|| MarketError::NotFound(format!("payment {}", payment_id)))?;

        if payment.payee != caller {
            return Err(MarketError::Unauthorized(format!(
                "payment {} does not belong to caller",
                payment_id
            )));
        }
        match payment.status {
            PaymentStatus::Withdrawn => return Err(MarketError::AlreadyWithdrawn(payment_id)),
            PaymentStatus::Released => {}
            other => {
                return Err(MarketError::invalid_transition(
                    other,
                    PaymentStatus::Withdrawn,
                ))
            }
        }

        let amount = payment.amount;
        let now = Utc::now();
        let mut hasher = blake3::Hasher::new();
        hasher.update(&payment_id.value().to_le_bytes());
        hasher.update(&caller.value().to_le_bytes());
        hasher.update(destination.as_bytes());
        hasher.update(&amount.to_base_units().to_le_bytes());
        hasher.update(&now.timestamp_millis().to_le_bytes());
        let receipt = hex::encode(hasher.finalize().as_bytes());

        payment.transition_to(PaymentStatus::Withdrawn)?;
        payment.receipt = Some(receipt.clone());
        ledger.escrow.withdrawn_amount = ledger
            .escrow
            .withdrawn_amount
            .checked_add(amount)
            .ok_or_else(|| MarketError::System("withdrawn counter overflow".into()))?;

        self.store.commit_gig(ledger, vec![]).await?;

        info!(
            gig_id = %gig_id,
            payment_id = %payment_id,
            amount = %amount,
            destination = destination,
            "💸 Payment withdrawn"
        );
        Ok(WithdrawReceipt {
            payment_id,
            gig_id,
            payee: caller,
            amount,
            receipt,
        })
    }

    /// Cancel a gig. The locked remainder is released like any other
    /// escrow release: outstanding advances are repaid from it first,
    /// and only the net flows back to the employer as a refund payment.
    /// Everything lands in one commit, so the balance equation keeps
    /// holding and no loan is left stranded without its backing escrow.
    pub async fn cancel_gig(&self, gig_id: GigId, caller: UserId) -> Result<CancelOutcome> {
        let mut ledger = self.store.gig(gig_id).await?;

        if ledger.gig.employer != caller {
            return Err(MarketError::Unauthorized(format!(
                "only the employer may cancel gig {}",
                gig_id
            )));
        }

        ledger.gig.transition_to(GigStatus::Cancelled)?;

        let mut outcome = CancelOutcome {
            gig_id,
            refunded: Amount::ZERO,
            repaid_total: Amount::ZERO,
            repayments: Vec::new(),
            refund_payment_id: None,
        };
        let mut collateral_updates = Vec::new();

        let locked = ledger.escrow.locked_amount;
        if !locked.is_zero() {
            ledger.escrow.locked_amount = Amount::ZERO;
            ledger.escrow.released_amount =
                ledger.escrow.released_amount.saturating_add(locked);

            let release = self.hook.on_escrow_released(&mut ledger, locked).await?;
            if !release.repaid_total.is_zero() {
                ledger.escrow.withdrawn_amount = ledger
                    .escrow
                    .withdrawn_amount
                    .checked_add(release.repaid_total)
                    .ok_or_else(|| MarketError::System("withdrawn counter overflow".into()))?;
            }

            if !release.net_payable.is_zero() {
                let now = Utc::now();
                let payment_id = PaymentId::new(self.store.allocate_id().await);
                ledger.payments.push(PaymentRecord {
                    id: payment_id,
                    gig_id,
                    milestone_id: None,
                    payee: ledger.gig.employer,
                    amount: release.net_payable,
                    status: PaymentStatus::Released,
                    receipt: None,
                    created_at: now,
                    updated_at: now,
                });
                outcome.refund_payment_id = Some(payment_id);
            }

            outcome.refunded = release.net_payable;
            outcome.repaid_total = release.repaid_total;
            outcome.repayments = release.repayments;
            collateral_updates = release.collateral_updates;

            ledger.gig.escrow_transition_to(EscrowStatus::Released)?;
        }

        self.store.commit_gig(ledger, collateral_updates).await?;
        info!(
            gig_id = %gig_id,
            refunded = %outcome.refunded,
            repaid = %outcome.repaid_total,
            "🛑 Gig cancelled"
        );
        Ok(outcome)
    }
}

/// Move one approved milestone's amount from locked to released inside
/// the snapshot. Returns the released amount.
pub(crate) fn apply_release(ledger: &mut GigLedger, milestone_id: MilestoneId) -> Result<Amount> {
    let (amount, status) = {
        let milestone = ledger
            .milestone(milestone_id)
            .ok_or_else(|| MarketError::NotFound(format!("milestone {}", milestone_id)))?;
        (milestone.amount, milestone.status)
    };

    if status != MilestoneStatus::Approved {
        return Err(MarketError::invalid_transition(
            status,
            MilestoneStatus::Released,
        ));
    }
    if ledger.escrow.locked_amount < amount {
        return Err(MarketError::InsufficientLockedFunds {
            required: amount,
            locked: ledger.escrow.locked_amount,
        });
    }

    let milestone = ledger
        .milestone_mut(milestone_id)
        .ok_or_else(|| MarketError::NotFound(format!("milestone {}", milestone_id)))?;
    milestone.transition_to(MilestoneStatus::Released)?;

    ledger.escrow.locked_amount = ledger
        .escrow
        .locked_amount
        .checked_sub(amount)
        .ok_or_else(|| MarketError::System("locked counter underflow".into()))?;
    ledger.escrow.released_amount = ledger
        .escrow
        .released_amount
        .checked_add(amount)
        .ok_or_else(|| MarketError::System("released counter overflow".into()))?;

    if ledger.escrow.locked_amount.is_zero() {
        ledger.gig.escrow_transition_to(EscrowStatus::Released)?;
    } else if ledger.gig.escrow_status == EscrowStatus::Deposited {
        ledger.gig.escrow_transition_to(EscrowStatus::PartiallyReleased)?;
    }

    if ledger.all_milestones_released() {
        ledger.gig.transition_to(GigStatus::Completed)?;
    } else if ledger.gig.status == GigStatus::MilestoneSubmitted {
        ledger.gig.transition_to(GigStatus::InProgress)?;
    }

    info!(
        gig_id = %ledger.gig.id,
        milestone_id = %milestone_id,
        amount = %amount,
        locked_after = %ledger.escrow.locked_amount,
        released_after = %ledger.escrow.released_amount,
        "🔓 Escrow released for milestone"
    );
    Ok(amount)
}
