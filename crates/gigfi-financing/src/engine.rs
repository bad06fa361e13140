use crate::policy::FinancingPolicy;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use gigfi_escrow::{LoanRepayment, ReleaseHook, ReleaseOutcome};
use gigfi_ledger::{CollateralRecord, GigLedger, LedgerStore, LoanRecord};
use gigfi_types::{
    Amount, CollateralId, CollateralKind, EscrowStatus, LifecycleState, LoanId, LoanStatus,
    MarketError, Result, UserId,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Issues advances against future escrow releases and repays them from
/// those releases, oldest loan first.
///
/// Underwriting checks run at request time; the collateral lock happens
/// at disbursement; repayment happens inside the escrow release commit
/// via the [`ReleaseHook`] implementation below.
pub struct FinancingEngine {
    store: Arc<dyn LedgerStore>,
    policy: FinancingPolicy,
}

impl FinancingEngine {
    pub fn new(store: Arc<dyn LedgerStore>, policy: FinancingPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &FinancingPolicy {
        &self.policy
    }

    /// Register a stake that can back endorsement, reputation or mixed
    /// advances.
    pub async fn register_collateral(
        &self,
        owner: UserId,
        kind: CollateralKind,
        asset_value: Amount,
    ) -> Result<CollateralId> {
        if !kind.needs_asset() {
            return Err(MarketError::Validation(
                "escrow-backed advances take no collateral asset".into(),
            ));
        }
        if asset_value.is_zero() {
            return Err(MarketError::Validation("collateral value is zero".into()));
        }

        let now = Utc::now();
        let id = CollateralId::new(self.store.allocate_id().await);
        self.store
            .create_collateral(CollateralRecord {
                id,
                owner,
                kind,
                asset_value,
                locked_amount: Amount::ZERO,
                version: 0,
                created_at: now,
                updated_at: now,
            })
            .await?;
        Ok(id)
    }

    /// Underwrite an advance request. On success the loan sits in
    /// `Pending` until approved; nothing is locked yet.
    pub async fn request_advance(
        &self,
        gig_id: gigfi_types::GigId,
        caller: UserId,
        requested: Amount,
        kind: CollateralKind,
        collateral_id: Option<CollateralId>,
    ) -> Result<LoanId> {
        let mut ledger = self.store.gig(gig_id).await?;

        if ledger.gig.worker != Some(caller) {
            return Err(MarketError::Unauthorized(format!(
                "only the assigned worker may borrow against gig {}",
                gig_id
            )));
        }
        if ledger.gig.status.is_terminal() {
            return Err(MarketError::Validation(format!(
                "gig {} is closed ({:?}), no new advances",
                gig_id, ledger.gig.status
            )));
        }
        if ledger.gig.escrow_status == EscrowStatus::NotDeposited {
            return Err(MarketError::Validation(
                "escrow must be deposited before an advance".into(),
            ));
        }
        if requested.is_zero() {
            return Err(MarketError::Validation("requested amount is zero".into()));
        }

        // Aggregate cap over every loan that is not terminal
        let cap = self.policy.advance_cap(ledger.gig.payment_amount);
        let outstanding = ledger.outstanding_principal();
        if outstanding.saturating_add(requested) > cap {
            return Err(MarketError::ExceedsBorrowingCap { requested, cap });
        }

        // The escrow must cover the share the collateral asset does not
        let escrow_share_bps = 10_000 - kind.required_collateral_ratio_bps();
        let escrow_required = requested.mul_bps(escrow_share_bps);
        if ledger.escrow.locked_amount < escrow_required {
            return Err(MarketError::InsufficientFunds {
                required: escrow_required,
                available: ledger.escrow.locked_amount,
            });
        }

        if kind.needs_asset() {
            let asset_id = collateral_id.ok_or_else(|| {
                MarketError::Validation(format!("{:?} advances need a collateral asset", kind))
            })?;
            let asset = self.store.collateral(asset_id).await?;
            if asset.owner != caller {
                return Err(MarketError::Unauthorized(format!(
                    "collateral {} belongs to another user",
                    asset_id
                )));
            }

            let required_lock = requested.mul_bps(kind.required_collateral_ratio_bps());
            if asset.available() < required_lock {
                return Err(MarketError::InsufficientCollateral {
                    required: required_lock.to_string(),
                    available: asset.available().to_string(),
                });
            }

            if kind == CollateralKind::Endorsement
                && asset.asset_value < self.policy.min_endorsement_stake
            {
                return Err(MarketError::InsufficientCollateral {
                    required: format!("stake of {}", self.policy.min_endorsement_stake),
                    available: asset.asset_value.to_string(),
                });
            }

            if kind == CollateralKind::Reputation {
                let score = self.reputation_score(caller).await?;
                if score < self.policy.min_reputation_score {
                    return Err(MarketError::InsufficientCollateral {
                        required: format!("reputation score {}", self.policy.min_reputation_score),
                        available: format!("reputation score {}", score),
                    });
                }
            }
        } else if collateral_id.is_some() {
            return Err(MarketError::Validation(
                "escrow-backed advances take no collateral asset".into(),
            ));
        }

        let now = Utc::now();
        let total_due = requested.saturating_add(requested.mul_bps(kind.interest_rate_bps()));
        let loan_id = LoanId::new(self.store.allocate_id().await);
        ledger.loans.push(LoanRecord {
            id: loan_id,
            gig_id,
            worker: caller,
            requested_amount: requested,
            approved_amount: requested,
            interest_rate_bps: kind.interest_rate_bps(),
            collateral_kind: kind,
            collateral_id,
            collateral_locked: Amount::ZERO,
            status: LoanStatus::Pending,
            total_due,
            total_repaid: Amount::ZERO,
            due_date: now + Duration::days(self.policy.loan_term_days),
            created_at: now,
            updated_at: now,
        });

        self.store.commit_gig(ledger, vec![]).await?;
        info!(
            gig_id = %gig_id,
            loan_id = %loan_id,
            worker = %caller,
            requested = %requested,
            kind = ?kind,
            total_due = %total_due,
            "🏦 Advance requested"
        );
        Ok(loan_id)
    }

    /// Underwriting already happened at request time; approval is a
    /// plain state advance.
    pub async fn approve_advance(&self, loan_id: LoanId) -> Result<()> {
        let gig_id = self.store.gig_id_for_loan(loan_id).await?;
        let mut ledger = self.store.gig(gig_id).await?;

        let loan = ledger
            .loan_mut(loan_id)
            .ok_or_else(|| MarketError::NotFound(format!("loan {}", loan_id)))?;
        loan.transition_to(LoanStatus::Approved)?;

        self.store.commit_gig(ledger, vec![]).await?;
        info!(gig_id = %gig_id, loan_id = %loan_id, "👍 Advance approved");
        Ok(())
    }

    /// Pay out an approved advance and lock its collateral share in the
    /// same commit. Returns the disbursed principal.
    pub async fn disburse_advance(&self, loan_id: LoanId) -> Result<Amount> {
        let gig_id = self.store.gig_id_for_loan(loan_id).await?;
        let mut ledger = self.store.gig(gig_id).await?;

        let loan = ledger
            .loan(loan_id)
            .ok_or_else(|| MarketError::NotFound(format!("loan {}", loan_id)))?;
        if loan.status != LoanStatus::Approved {
            return Err(MarketError::invalid_transition(
                loan.status,
                LoanStatus::Disbursed,
            ));
        }

        let principal = loan.approved_amount;
        let required_lock = principal.mul_bps(loan.collateral_kind.required_collateral_ratio_bps());
        let collateral_id = loan.collateral_id;

        let mut collateral_updates = Vec::new();
        if !required_lock.is_zero() {
            let asset_id = collateral_id
                .ok_or_else(|| MarketError::System("collateralized loan without asset".into()))?;
            let mut asset = self.store.collateral(asset_id).await?;
            if asset.available() < required_lock {
                return Err(MarketError::InsufficientCollateral {
                    required: required_lock.to_string(),
                    available: asset.available().to_string(),
                });
            }
            asset.locked_amount = asset.locked_amount.saturating_add(required_lock);
            asset.updated_at = Utc::now();
            collateral_updates.push(asset);
        }

        let loan = ledger
            .loan_mut(loan_id)
            .ok_or_else(|| MarketError::NotFound(format!("loan {}", loan_id)))?;
        loan.transition_to(LoanStatus::Disbursed)?;
        loan.collateral_locked = required_lock;

        self.store.commit_gig(ledger, collateral_updates).await?;
        info!(
            gig_id = %gig_id,
            loan_id = %loan_id,
            principal = %principal,
            collateral_locked = %required_lock,
            "💵 Advance disbursed"
        );
        Ok(principal)
    }

    /// Mark an overdue loan defaulted. The collateral lock is retained
    /// for the off-ledger recovery process, not released.
    pub async fn mark_defaulted(&self, loan_id: LoanId) -> Result<()> {
        let gig_id = self.store.gig_id_for_loan(loan_id).await?;
        let mut ledger = self.store.gig(gig_id).await?;

        let loan = ledger
            .loan_mut(loan_id)
            .ok_or_else(|| MarketError::NotFound(format!("loan {}", loan_id)))?;
        if !loan.is_overdue(Utc::now()) {
            return Err(MarketError::Validation(format!(
                "loan {} is not overdue",
                loan_id
            )));
        }
        loan.transition_to(LoanStatus::Defaulted)?;

        self.store.commit_gig(ledger, vec![]).await?;
        warn!(gig_id = %gig_id, loan_id = %loan_id, "⛔ Loan defaulted");
        Ok(())
    }

    /// Average rating times 100, zero when unrated.
    async fn reputation_score(&self, worker: UserId) -> Result<u32> {
        let ratings = self.store.ratings_for(worker).await?;
        if ratings.is_empty() {
            return Ok(0);
        }
        let sum: u32 = ratings.iter().map(|r| r.score as u32).sum();
        Ok(sum * 100 / ratings.len() as u32)
    }
}

#[async_trait]
impl ReleaseHook for FinancingEngine {
    /// Repayment waterfall: outstanding loans in disbursement order each
    /// take up to their remaining due from the released amount; whatever
    /// is left is the worker's.
    async fn on_escrow_released(
        &self,
        ledger: &mut GigLedger,
        released: Amount,
    ) -> Result<ReleaseOutcome> {
        let mut order: Vec<(chrono::DateTime<Utc>, LoanId)> = ledger
            .loans
            .iter()
            .filter(|l| l.status.is_outstanding())
            .map(|l| (l.created_at, l.id))
            .collect();
        order.sort();

        let mut remaining = released;
        let mut repaid_total = Amount::ZERO;
        let mut repayments = Vec::new();
        let mut released_locks: Vec<(CollateralId, Amount)> = Vec::new();

        for (_, loan_id) in order {
            if remaining.is_zero() {
                break;
            }
            let loan = match ledger.loan_mut(loan_id) {
                Some(loan) => loan,
                None => continue,
            };
            let pay = loan.outstanding_due().min(remaining);
            if pay.is_zero() {
                continue;
            }

            loan.total_repaid = loan
                .total_repaid
                .checked_add(pay)
                .ok_or_else(|| MarketError::System("repaid counter overflow".into()))?;
            remaining = remaining.saturating_sub(pay);
            repaid_total = repaid_total.saturating_add(pay);

            let settled = loan.total_repaid == loan.total_due;
            if loan.status == LoanStatus::Disbursed && !settled {
                loan.transition_to(LoanStatus::Repaying)?;
            }
            if settled {
                loan.transition_to(LoanStatus::Repaid)?;
                if let (Some(asset_id), false) =
                    (loan.collateral_id, loan.collateral_locked.is_zero())
                {
                    released_locks.push((asset_id, loan.collateral_locked));
                }
            }

            info!(
                gig_id = %ledger.gig.id,
                loan_id = %loan_id,
                amount = %pay,
                settled,
                "💳 Loan repayment applied"
            );
            repayments.push(LoanRepayment {
                loan_id,
                amount: pay,
                settled,
            });
        }

        let mut collateral_updates = Vec::new();
        for (asset_id, lock) in released_locks {
            let mut asset = self.store.collateral(asset_id).await?;
            asset.locked_amount = asset.locked_amount.saturating_sub(lock);
            asset.updated_at = Utc::now();
            collateral_updates.push(asset);
        }

        Ok(ReleaseOutcome {
            net_payable: remaining,
            repaid_total,
            repayments,
            collateral_updates,
        })
    }
}
