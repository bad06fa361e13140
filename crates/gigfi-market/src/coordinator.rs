use chrono::Utc;
use gigfi_escrow::{
    CancelOutcome, EscrowEngine, MilestoneMachine, MilestoneSpec, ReviewOutcome, WithdrawReceipt,
};
use gigfi_financing::{FinancingEngine, FinancingPolicy};
use gigfi_ledger::{LedgerStore, RatingRecord};
use gigfi_types::{
    Amount, CollateralId, CollateralKind, DomainEvent, GigId, GigStatus, LoanId, LoanStatus,
    MarketError, MilestoneId, PaymentId, Result, UserId,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

/// Coordinator tuning knobs.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub financing: FinancingPolicy,
    /// Attempts per command before a version conflict is surfaced.
    pub max_commit_attempts: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            financing: FinancingPolicy::default(),
            max_commit_attempts: 3,
        }
    }
}

/// Single command surface over the escrow, milestone and financing
/// engines.
///
/// Owns the conflict-retry loop and domain-event emission so the
/// engines stay free of both concerns. Events are emitted strictly
/// after the underlying commit succeeded; a dropped receiver never
/// fails a command.
pub struct MarketCoordinator {
    store: Arc<dyn LedgerStore>,
    escrow: EscrowEngine,
    milestones: MilestoneMachine,
    financing: Arc<FinancingEngine>,
    config: MarketConfig,
    events: Option<UnboundedSender<DomainEvent>>,
}

impl MarketCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, config: MarketConfig) -> Self {
        let financing = Arc::new(FinancingEngine::new(
            store.clone(),
            config.financing.clone(),
        ));
        Self {
            escrow: EscrowEngine::new(store.clone(), financing.clone()),
            milestones: MilestoneMachine::new(store.clone(), financing.clone()),
            financing,
            store,
            config,
            events: None,
        }
    }

    /// Same as [`new`](Self::new) but wired to an event channel.
    pub fn with_events(
        store: Arc<dyn LedgerStore>,
        config: MarketConfig,
    ) -> (Self, UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut coordinator = Self::new(store, config);
        coordinator.events = Some(tx);
        (coordinator, rx)
    }

    pub async fn post_gig(
        &self,
        employer: UserId,
        title: &str,
        payment_amount: Amount,
        milestones: Vec<MilestoneSpec>,
    ) -> Result<GigId> {
        let gig_id = self
            .escrow
            .post_gig(employer, title, payment_amount, milestones)
            .await?;
        self.emit(DomainEvent::GigPosted {
            gig_id,
            employer,
            payment_amount,
        });
        Ok(gig_id)
    }

    pub async fn deposit_escrow(
        &self,
        gig_id: GigId,
        caller: UserId,
        amount: Amount,
    ) -> Result<()> {
        self.with_retry(|| self.escrow.deposit_escrow(gig_id, caller, amount))
            .await?;
        self.emit(DomainEvent::EscrowDeposited { gig_id, amount });
        Ok(())
    }

    pub async fn assign_worker(&self, gig_id: GigId, caller: UserId, worker: UserId) -> Result<()> {
        self.with_retry(|| self.escrow.assign_worker(gig_id, caller, worker))
            .await?;
        self.emit(DomainEvent::WorkerAssigned { gig_id, worker });
        Ok(())
    }

    pub async fn submit_milestone(
        &self,
        milestone_id: MilestoneId,
        caller: UserId,
        note: Option<String>,
        url: Option<String>,
    ) -> Result<()> {
        self.with_retry(|| {
            self.milestones
                .submit_work(milestone_id, caller, note.clone(), url.clone())
        })
        .await?;
        let gig_id = self.store.gig_id_for_milestone(milestone_id).await?;
        self.emit(DomainEvent::MilestoneSubmitted {
            gig_id,
            milestone_id,
            worker: caller,
        });
        Ok(())
    }

    /// Review a submitted milestone. Approval fans out into release,
    /// repayment and completion events in commit order.
    pub async fn review_milestone(
        &self,
        milestone_id: MilestoneId,
        caller: UserId,
        approved: bool,
        comments: Option<String>,
    ) -> Result<ReviewOutcome> {
        let outcome = self
            .with_retry(|| {
                self.milestones
                    .review(milestone_id, caller, approved, comments.clone())
            })
            .await?;

        self.emit(DomainEvent::MilestoneReviewed {
            gig_id: outcome.gig_id,
            milestone_id,
            approved: outcome.approved,
        });
        if outcome.approved {
            self.emit(DomainEvent::EscrowReleased {
                gig_id: outcome.gig_id,
                milestone_id,
                amount: outcome.released,
                net_payable: outcome.net_payable,
            });
            for repayment in &outcome.repayments {
                self.emit(DomainEvent::LoanRepaid {
                    gig_id: outcome.gig_id,
                    loan_id: repayment.loan_id,
                    amount: repayment.amount,
                    settled: repayment.settled,
                });
            }
            if outcome.gig_completed {
                self.emit(DomainEvent::GigCompleted {
                    gig_id: outcome.gig_id,
                });
            }
        }
        Ok(outcome)
    }

    pub async fn withdraw_payment(
        &self,
        payment_id: PaymentId,
        caller: UserId,
        destination: &str,
    ) -> Result<WithdrawReceipt> {
        let receipt = self
            .with_retry(|| self.escrow.withdraw(payment_id, caller, destination))
            .await?;
        self.emit(DomainEvent::PaymentWithdrawn {
            gig_id: receipt.gig_id,
            payment_id,
            amount: receipt.amount,
            receipt: receipt.receipt.clone(),
        });
        Ok(receipt)
    }

    /// Cancel a gig. Outstanding advances repay themselves out of the
    /// locked escrow before the employer refund, so the repayment events
    /// precede the cancellation event.
    pub async fn cancel_gig(&self, gig_id: GigId, caller: UserId) -> Result<CancelOutcome> {
        let outcome = self
            .with_retry(|| self.escrow.cancel_gig(gig_id, caller))
            .await?;
        for repayment in &outcome.repayments {
            self.emit(DomainEvent::LoanRepaid {
                gig_id,
                loan_id: repayment.loan_id,
                amount: repayment.amount,
                settled: repayment.settled,
            });
        }
        self.emit(DomainEvent::GigCancelled {
            gig_id,
            refunded: outcome.refunded,
        });
        Ok(outcome)
    }

    pub async fn register_collateral(
        &self,
        owner: UserId,
        kind: CollateralKind,
        asset_value: Amount,
    ) -> Result<CollateralId> {
        self.financing
            .register_collateral(owner, kind, asset_value)
            .await
    }

    pub async fn request_advance(
        &self,
        gig_id: GigId,
        caller: UserId,
        amount: Amount,
        kind: CollateralKind,
        collateral_id: Option<CollateralId>,
    ) -> Result<LoanId> {
        let loan_id = self
            .with_retry(|| {
                self.financing
                    .request_advance(gig_id, caller, amount, kind, collateral_id)
            })
            .await?;
        self.emit(DomainEvent::AdvanceRequested {
            gig_id,
            loan_id,
            worker: caller,
            amount,
        });
        Ok(loan_id)
    }

    /// Disburse a requested advance, approving it first when it is
    /// still pending. Underwriting already ran at request time, so
    /// approval needs no further checks here.
    pub async fn disburse_advance(&self, loan_id: LoanId) -> Result<Amount> {
        let gig_id = self.store.gig_id_for_loan(loan_id).await?;
        let ledger = self.store.gig(gig_id).await?;
        let status = ledger
            .loan(loan_id)
            .ok_or_else(|| MarketError::NotFound(format!("loan {}", loan_id)))?
            .status;
        if status == LoanStatus::Pending {
            self.with_retry(|| self.financing.approve_advance(loan_id))
                .await?;
        }

        let amount = self
            .with_retry(|| self.financing.disburse_advance(loan_id))
            .await?;
        self.emit(DomainEvent::AdvanceDisbursed {
            gig_id,
            loan_id,
            amount,
        });
        Ok(amount)
    }

    pub async fn mark_loan_defaulted(&self, loan_id: LoanId) -> Result<()> {
        self.with_retry(|| self.financing.mark_defaulted(loan_id))
            .await?;
        self.emit(DomainEvent::LoanDefaulted { loan_id });
        Ok(())
    }

    /// Employer rates the worker on a completed gig.
    pub async fn rate_worker(
        &self,
        gig_id: GigId,
        caller: UserId,
        score: u8,
        feedback: Option<String>,
    ) -> Result<()> {
        if !(1..=5).contains(&score) {
            return Err(MarketError::Validation(format!(
                "rating score {} outside 1..=5",
                score
            )));
        }

        let ledger = self.store.gig(gig_id).await?;
        if ledger.gig.employer != caller {
            return Err(MarketError::Unauthorized(format!(
                "only the employer may rate gig {}",
                gig_id
            )));
        }
        if ledger.gig.status != GigStatus::Completed {
            return Err(MarketError::Validation(format!(
                "gig {} is not completed",
                gig_id
            )));
        }
        let worker = ledger
            .gig
            .worker
            .ok_or_else(|| MarketError::System("completed gig has no worker".into()))?;

        self.store
            .record_rating(RatingRecord {
                gig_id,
                worker,
                employer: caller,
                score,
                feedback,
                created_at: Utc::now(),
            })
            .await?;
        info!(gig_id = %gig_id, worker = %worker, score, "⭐ Worker rated");
        self.emit(DomainEvent::WorkerRated {
            gig_id,
            worker,
            score,
        });
        Ok(())
    }

    fn emit(&self, event: DomainEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Re-run a command while it fails with a retryable conflict.
    /// Commands re-load their snapshot on entry, so a retry observes
    /// the state that beat it to the commit.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Err(err) if err.is_retryable() && attempt < self.config.max_commit_attempts => {
                    warn!(attempt, error = %err, "🔁 Command hit a conflict, retrying");
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigfi_ledger::MemoryLedger;

    const EMPLOYER: UserId = UserId::new(1);
    const WORKER: UserId = UserId::new(2);

    fn specs() -> Vec<MilestoneSpec> {
        vec![MilestoneSpec {
            description: "Everything".into(),
            amount: Amount::from_tokens(500),
            payment_percentage: 100,
        }]
    }

    async fn drain(rx: &mut UnboundedReceiver<DomainEvent>) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_events_follow_commit_order() {
        let store = Arc::new(MemoryLedger::new());
        let (market, mut rx) = MarketCoordinator::with_events(store.clone(), MarketConfig::default());

        let gig_id = market
            .post_gig(EMPLOYER, "Logo", Amount::from_tokens(500), specs())
            .await
            .unwrap();
        market
            .deposit_escrow(gig_id, EMPLOYER, Amount::from_tokens(500))
            .await
            .unwrap();
        market.assign_worker(gig_id, EMPLOYER, WORKER).await.unwrap();

        let milestone_id = store.gig(gig_id).await.unwrap().next_milestone().unwrap().id;
        market
            .submit_milestone(milestone_id, WORKER, None, None)
            .await
            .unwrap();
        market
            .review_milestone(milestone_id, EMPLOYER, true, None)
            .await
            .unwrap();

        let events = drain(&mut rx).await;
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                DomainEvent::GigPosted { .. } => "posted",
                DomainEvent::EscrowDeposited { .. } => "deposited",
                DomainEvent::WorkerAssigned { .. } => "assigned",
                DomainEvent::MilestoneSubmitted { .. } => "submitted",
                DomainEvent::MilestoneReviewed { .. } => "reviewed",
                DomainEvent::EscrowReleased { .. } => "released",
                DomainEvent::GigCompleted { .. } => "completed",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "posted",
                "deposited",
                "assigned",
                "submitted",
                "reviewed",
                "released",
                "completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_rating_requires_completed_gig() {
        let store = Arc::new(MemoryLedger::new());
        let market = MarketCoordinator::new(store.clone(), MarketConfig::default());

        let gig_id = market
            .post_gig(EMPLOYER, "Logo", Amount::from_tokens(500), specs())
            .await
            .unwrap();
        market
            .deposit_escrow(gig_id, EMPLOYER, Amount::from_tokens(500))
            .await
            .unwrap();
        market.assign_worker(gig_id, EMPLOYER, WORKER).await.unwrap();

        let err = market
            .rate_worker(gig_id, EMPLOYER, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let err = market.rate_worker(gig_id, EMPLOYER, 6, None).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let milestone_id = store.gig(gig_id).await.unwrap().next_milestone().unwrap().id;
        market
            .submit_milestone(milestone_id, WORKER, None, None)
            .await
            .unwrap();
        market
            .review_milestone(milestone_id, EMPLOYER, true, None)
            .await
            .unwrap();

        market.rate_worker(gig_id, EMPLOYER, 5, None).await.unwrap();
        let ratings = store.ratings_for(WORKER).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].score, 5);
    }

    #[tokio::test]
    async fn test_disburse_auto_approves_pending_loan() {
        let store = Arc::new(MemoryLedger::new());
        let market = MarketCoordinator::new(store.clone(), MarketConfig::default());

        let gig_id = market
            .post_gig(EMPLOYER, "Logo", Amount::from_tokens(500), specs())
            .await
            .unwrap();
        market
            .deposit_escrow(gig_id, EMPLOYER, Amount::from_tokens(500))
            .await
            .unwrap();
        market.assign_worker(gig_id, EMPLOYER, WORKER).await.unwrap();

        let loan_id = market
            .request_advance(
                gig_id,
                WORKER,
                Amount::from_tokens(200),
                CollateralKind::EscrowBacked,
                None,
            )
            .await
            .unwrap();
        let amount = market.disburse_advance(loan_id).await.unwrap();
        assert_eq!(amount, Amount::from_tokens(200));

        let ledger = store.gig(gig_id).await.unwrap();
        assert_eq!(ledger.loan(loan_id).unwrap().status, LoanStatus::Disbursed);
    }
}
