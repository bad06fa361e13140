use gigfi_types::Amount;
use serde::{Deserialize, Serialize};

/// Tunable lending rules. Interest rates and collateral ratios live on
/// `CollateralKind`; everything an operator might want to adjust per
/// deployment lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingPolicy {
    /// Aggregate advance cap per gig, in basis points of the gig
    /// payment. Counts every non-terminal loan, not just disbursed ones.
    pub max_advance_ratio_bps: u32,
    /// Minimum asset value for an endorsement stake.
    pub min_endorsement_stake: Amount,
    /// Minimum reputation score (average rating times 100) for
    /// reputation-backed advances.
    pub min_reputation_score: u32,
    /// Loan term; past this the loan is overdue and may be defaulted.
    pub loan_term_days: i64,
}

impl Default for FinancingPolicy {
    fn default() -> Self {
        Self {
            max_advance_ratio_bps: 8_000,
            min_endorsement_stake: Amount::from_tokens(100),
            min_reputation_score: 400,
            loan_term_days: 30,
        }
    }
}

impl FinancingPolicy {
    /// Absolute borrowing cap for a gig payment.
    pub fn advance_cap(&self, payment_amount: Amount) -> Amount {
        payment_amount.mul_bps(self.max_advance_ratio_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cap_is_eighty_percent() {
        let policy = FinancingPolicy::default();
        assert_eq!(
            policy.advance_cap(Amount::from_tokens(1000)),
            Amount::from_tokens(800)
        );
    }
}
