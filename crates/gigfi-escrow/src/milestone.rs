use crate::engine::apply_release;
use crate::hook::{LoanRepayment, ReleaseHook};
use chrono::Utc;
use gigfi_ledger::{LedgerStore, PaymentRecord};
use gigfi_types::{
    Amount, GigId, GigStatus, MarketError, MilestoneId, MilestoneStatus, PaymentId, PaymentStatus,
    Result, UserId,
};
use std::sync::Arc;
use tracing::info;

/// What a milestone review decided and, on approval, what moved.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub gig_id: GigId,
    pub milestone_id: MilestoneId,
    pub approved: bool,
    /// Escrow released for this milestone. Zero on rejection.
    pub released: Amount,
    /// What the worker can withdraw after loan repayments.
    pub net_payable: Amount,
    pub repayments: Vec<LoanRepayment>,
    /// Set when a worker payment row was created (net payable > 0).
    pub payment_id: Option<PaymentId>,
    pub gig_completed: bool,
}

/// Drives milestone submissions and reviews.
///
/// Approval is the hot path: milestone release, loan repayment and the
/// worker's payment row all land in one ledger commit, so no observer
/// can see a released milestone without its matching money movement.
pub struct MilestoneMachine {
    store: Arc<dyn LedgerStore>,
    hook: Arc<dyn ReleaseHook>,
}

impl MilestoneMachine {
    pub fn new(store: Arc<dyn LedgerStore>, hook: Arc<dyn ReleaseHook>) -> Self {
        Self { store, hook }
    }

    /// Worker submits a milestone for review. Resubmission after a
    /// rejection goes through here as well.
    pub async fn submit_work(
        &self,
        milestone_id: MilestoneId,
        caller: UserId,
        note: Option<String>,
        url: Option<String>,
    ) -> Result<()> {
        let gig_id = self.store.gig_id_for_milestone(milestone_id).await?;
        let mut ledger = self.store.gig(gig_id).await?;

        if ledger.gig.worker != Some(caller) {
            return Err(MarketError::Unauthorized(format!(
                "only the assigned worker may submit milestone {}",
                milestone_id
            )));
        }

        let milestone = ledger
            .milestone_mut(milestone_id)
            .ok_or_else(|| MarketError::NotFound(format!("milestone {}", milestone_id)))?;

        if milestone.status == MilestoneStatus::Submitted {
            return Err(MarketError::AlreadyPending(milestone_id));
        }
        milestone.transition_to(MilestoneStatus::Submitted)?;
        milestone.submission_note = note;
        milestone.submission_url = url;
        milestone.submitted_at = Some(Utc::now());

        if ledger.gig.status != GigStatus::MilestoneSubmitted {
            ledger.gig.transition_to(GigStatus::MilestoneSubmitted)?;
        }

        self.store.commit_gig(ledger, vec![]).await?;
        info!(
            gig_id = %gig_id,
            milestone_id = %milestone_id,
            worker = %caller,
            "📬 Milestone submitted for review"
        );
        Ok(())
    }

    /// Employer reviews a submitted milestone.
    ///
    /// Rejection records the comments and hands the gig back to the
    /// worker. Approval releases the milestone's escrow, runs the
    /// repayment hook against the same snapshot, and commits everything
    /// at once.
    pub async fn review(
        &self,
        milestone_id: MilestoneId,
        caller: UserId,
        approved: bool,
        comments: Option<String>,
    ) -> Result<ReviewOutcome> {
        let gig_id = self.store.gig_id_for_milestone(milestone_id).await?;
        let mut ledger = self.store.gig(gig_id).await?;

        if ledger.gig.employer != caller {
            return Err(MarketError::Unauthorized(format!(
                "only the employer may review milestone {}",
                milestone_id
            )));
        }

        let milestone = ledger
            .milestone_mut(milestone_id)
            .ok_or_else(|| MarketError::NotFound(format!("milestone {}", milestone_id)))?;

        if milestone.status != MilestoneStatus::Submitted {
            return Err(MarketError::invalid_transition(
                milestone.status,
                if approved {
                    MilestoneStatus::Approved
                } else {
                    MilestoneStatus::Rejected
                },
            ));
        }

        let now = Utc::now();
        milestone.review_comments = comments;
        milestone.reviewed_at = Some(now);

        if !approved {
            milestone.transition_to(MilestoneStatus::Rejected)?;
            ledger.gig.transition_to(GigStatus::InProgress)?;
            self.store.commit_gig(ledger, vec![]).await?;
            info!(
                gig_id = %gig_id,
                milestone_id = %milestone_id,
                "🔁 Milestone rejected, awaiting resubmission"
            );
            return Ok(ReviewOutcome {
                gig_id,
                milestone_id,
                approved: false,
                released: Amount::ZERO,
                net_payable: Amount::ZERO,
                repayments: Vec::new(),
                payment_id: None,
                gig_completed: false,
            });
        }

        milestone.transition_to(MilestoneStatus::Approved)?;
        let released = apply_release(&mut ledger, milestone_id)?;

        let outcome = self.hook.on_escrow_released(&mut ledger, released).await?;

        // The repaid slice never reaches a wallet; it leaves the escrow
        // at release time and counts as withdrawn immediately.
        if !outcome.repaid_total.is_zero() {
            ledger.escrow.withdrawn_amount = ledger
                .escrow
                .withdrawn_amount
                .checked_add(outcome.repaid_total)
                .ok_or_else(|| MarketError::System("withdrawn counter overflow".into()))?;
        }

        let payment_id = if outcome.net_payable.is_zero() {
            None
        } else {
            let worker = ledger
                .gig
                .worker
                .ok_or_else(|| MarketError::System("approved gig has no worker".into()))?;
            let id = PaymentId::new(self.store.allocate_id().await);
            ledger.payments.push(PaymentRecord {
                id,
                gig_id,
                milestone_id: Some(milestone_id),
                payee: worker,
                amount: outcome.net_payable,
                status: PaymentStatus::Released,
                receipt: None,
                created_at: now,
                updated_at: now,
            });
            Some(id)
        };

        let gig_completed = ledger.gig.status == GigStatus::Completed;
        self.store
            .commit_gig(ledger, outcome.collateral_updates.clone())
            .await?;

        info!(
            gig_id = %gig_id,
            milestone_id = %milestone_id,
            released = %released,
            net_payable = %outcome.net_payable,
            repayments = outcome.repayments.len(),
            gig_completed,
            "✅ Milestone approved and released"
        );
        Ok(ReviewOutcome {
            gig_id,
            milestone_id,
            approved: true,
            released,
            net_payable: outcome.net_payable,
            repayments: outcome.repayments,
            payment_id,
            gig_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EscrowEngine, MilestoneSpec};
    use crate::hook::NoopReleaseHook;
    use gigfi_ledger::MemoryLedger;
    use gigfi_types::EscrowStatus;

    const EMPLOYER: UserId = UserId::new(1);
    const WORKER: UserId = UserId::new(2);

    struct Fixture {
        store: Arc<MemoryLedger>,
        engine: EscrowEngine,
        machine: MilestoneMachine,
        gig_id: GigId,
    }

    async fn funded_gig() -> Fixture {
        let store = Arc::new(MemoryLedger::new());
        let engine = EscrowEngine::new(store.clone(), Arc::new(NoopReleaseHook));
        let machine = MilestoneMachine::new(store.clone(), Arc::new(NoopReleaseHook));

        let gig_id = engine
            .post_gig(
                EMPLOYER,
                "Mobile app",
                Amount::from_tokens(1000),
                vec![
                    MilestoneSpec {
                        description: "Design".into(),
                        amount: Amount::from_tokens(600),
                        payment_percentage: 60,
                    },
                    MilestoneSpec {
                        description: "Build".into(),
                        amount: Amount::from_tokens(400),
                        payment_percentage: 40,
                    },
                ],
            )
            .await
            .unwrap();
        engine
            .deposit_escrow(gig_id, EMPLOYER, Amount::from_tokens(1000))
            .await
            .unwrap();
        engine.assign_worker(gig_id, EMPLOYER, WORKER).await.unwrap();

        Fixture {
            store,
            engine,
            machine,
            gig_id,
        }
    }

    async fn first_milestone(f: &Fixture) -> MilestoneId {
        f.store
            .gig(f.gig_id)
            .await
            .unwrap()
            .next_milestone()
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_submit_requires_assigned_worker() {
        let f = funded_gig().await;
        let m = first_milestone(&f).await;

        let err = f
            .machine
            .submit_work(m, EMPLOYER, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));

        f.machine
            .submit_work(m, WORKER, Some("done".into()), None)
            .await
            .unwrap();

        // Double submission is flagged, not silently accepted
        let err = f
            .machine
            .submit_work(m, WORKER, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::AlreadyPending(_)));
    }

    #[tokio::test]
    async fn test_rejection_allows_resubmission() {
        let f = funded_gig().await;
        let m = first_milestone(&f).await;

        f.machine.submit_work(m, WORKER, None, None).await.unwrap();
        let outcome = f
            .machine
            .review(m, EMPLOYER, false, Some("missing assets".into()))
            .await
            .unwrap();
        assert!(!outcome.approved);
        assert_eq!(outcome.released, Amount::ZERO);

        let ledger = f.store.gig(f.gig_id).await.unwrap();
        assert_eq!(ledger.gig.status, GigStatus::InProgress);
        assert_eq!(
            ledger.milestone(m).unwrap().status,
            MilestoneStatus::Rejected
        );
        // Nothing moved
        assert_eq!(ledger.escrow.locked_amount, Amount::from_tokens(1000));

        // Resubmit and approve
        f.machine.submit_work(m, WORKER, None, None).await.unwrap();
        let outcome = f.machine.review(m, EMPLOYER, true, None).await.unwrap();
        assert_eq!(outcome.released, Amount::from_tokens(600));
    }

    #[tokio::test]
    async fn test_approval_releases_and_pays_worker() {
        let f = funded_gig().await;
        let m = first_milestone(&f).await;

        f.machine.submit_work(m, WORKER, None, None).await.unwrap();
        let outcome = f.machine.review(m, EMPLOYER, true, None).await.unwrap();

        assert!(outcome.approved);
        assert_eq!(outcome.released, Amount::from_tokens(600));
        assert_eq!(outcome.net_payable, Amount::from_tokens(600));
        assert!(outcome.repayments.is_empty());
        assert!(!outcome.gig_completed);

        let ledger = f.store.gig(f.gig_id).await.unwrap();
        assert_eq!(ledger.escrow.locked_amount, Amount::from_tokens(400));
        assert_eq!(ledger.escrow.released_amount, Amount::from_tokens(600));
        assert_eq!(ledger.gig.escrow_status, EscrowStatus::PartiallyReleased);
        assert_eq!(ledger.gig.status, GigStatus::InProgress);

        let payment = ledger.payment(outcome.payment_id.unwrap()).unwrap();
        assert_eq!(payment.payee, WORKER);
        assert_eq!(payment.amount, Amount::from_tokens(600));
        assert_eq!(payment.status, PaymentStatus::Released);
    }

    #[tokio::test]
    async fn test_final_release_completes_gig() {
        let f = funded_gig().await;

        let m1 = first_milestone(&f).await;
        f.machine.submit_work(m1, WORKER, None, None).await.unwrap();
        f.machine.review(m1, EMPLOYER, true, None).await.unwrap();

        let m2 = first_milestone(&f).await;
        f.machine.submit_work(m2, WORKER, None, None).await.unwrap();
        let outcome = f.machine.review(m2, EMPLOYER, true, None).await.unwrap();
        assert!(outcome.gig_completed);

        let ledger = f.store.gig(f.gig_id).await.unwrap();
        assert_eq!(ledger.gig.status, GigStatus::Completed);
        assert_eq!(ledger.gig.escrow_status, EscrowStatus::Released);
        assert_eq!(ledger.escrow.locked_amount, Amount::ZERO);
        assert_eq!(ledger.escrow.released_amount, Amount::from_tokens(1000));
        assert!(ledger.all_milestones_released());
        assert_eq!(ledger.progress_percent(), 100);
    }

    #[tokio::test]
    async fn test_withdraw_after_release() {
        let f = funded_gig().await;
        let m = first_milestone(&f).await;

        f.machine.submit_work(m, WORKER, None, None).await.unwrap();
        let outcome = f.machine.review(m, EMPLOYER, true, None).await.unwrap();
        let payment_id = outcome.payment_id.unwrap();

        // Not the payee
        let err = f
            .engine
            .withdraw(payment_id, EMPLOYER, "wallet-emp")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));

        let receipt = f
            .engine
            .withdraw(payment_id, WORKER, "wallet-123")
            .await
            .unwrap();
        assert_eq!(receipt.amount, Amount::from_tokens(600));
        assert!(!receipt.receipt.is_empty());

        // Withdrawal is one-shot
        let err = f
            .engine
            .withdraw(payment_id, WORKER, "wallet-123")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::AlreadyWithdrawn(_)));

        let ledger = f.store.gig(f.gig_id).await.unwrap();
        assert_eq!(ledger.escrow.withdrawn_amount, Amount::from_tokens(600));
        assert_eq!(
            ledger.payment(payment_id).unwrap().status,
            PaymentStatus::Withdrawn
        );
    }
}
