use async_trait::async_trait;
use gigfi_ledger::{CollateralRecord, GigLedger};
use gigfi_types::{Amount, LoanId, Result};

/// One loan's share of a repayment waterfall.
#[derive(Debug, Clone)]
pub struct LoanRepayment {
    pub loan_id: LoanId,
    pub amount: Amount,
    /// True when this repayment settled the loan in full.
    pub settled: bool,
}

/// Result of running loan repayment against an escrow release.
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    /// What remains for the worker after repayments.
    pub net_payable: Amount,
    /// Sum deducted toward loans; accounted as withdrawn escrow.
    pub repaid_total: Amount,
    pub repayments: Vec<LoanRepayment>,
    /// Collateral assets whose locks changed; committed atomically with
    /// the gig ledger.
    pub collateral_updates: Vec<CollateralRecord>,
}

impl ReleaseOutcome {
    pub fn passthrough(amount: Amount) -> Self {
        Self {
            net_payable: amount,
            repaid_total: Amount::ZERO,
            repayments: Vec::new(),
            collateral_updates: Vec::new(),
        }
    }
}

/// Subscriber interface for escrow releases.
///
/// The escrow engine calls this inside the release snapshot, before the
/// commit, so the payment split and any loan updates land in one
/// transaction. The escrow engine knows nothing about financing
/// internals; the dependency points one way.
#[async_trait]
pub trait ReleaseHook: Send + Sync {
    /// Mutate the snapshot's loans for the released amount and report
    /// what is left for the worker. Must not fail for input reasons;
    /// any error here aborts the enclosing commit as a system error.
    async fn on_escrow_released(
        &self,
        ledger: &mut GigLedger,
        released: Amount,
    ) -> Result<ReleaseOutcome>;
}

/// Hook used when no financing engine is wired: everything passes
/// through to the worker.
pub struct NoopReleaseHook;

#[async_trait]
impl ReleaseHook for NoopReleaseHook {
    async fn on_escrow_released(
        &self,
        _ledger: &mut GigLedger,
        released: Amount,
    ) -> Result<ReleaseOutcome> {
        Ok(ReleaseOutcome::passthrough(released))
    }
}
