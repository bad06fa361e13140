use gigfi_ledger::{GigLedger, LedgerStore};
use gigfi_types::{Amount, LifecycleState, MilestoneStatus, PaymentStatus, Result, Role, UserId};
use serde::Serialize;
use std::sync::Arc;

/// Dashboard grouping for a user's gigs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GigTab {
    /// Open or underway, nothing awaiting review.
    Active,
    /// At least one milestone is submitted and waiting on the employer.
    PendingRelease,
    /// Completed or cancelled.
    History,
}

/// Worker-side money totals across all gigs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    /// Everything ever released to the user, withdrawn or not.
    pub total_earnings: Amount,
    /// Released and still waiting for withdrawal.
    pub total_released: Amount,
    /// Escrow still locked on the user's gigs.
    pub total_locked: Amount,
    /// Submitted milestone amounts awaiting review.
    pub pending_release: Amount,
    pub active_gigs: usize,
}

/// Read-only views over the ledger. Never mutates and never retries;
/// a projection is whatever the store returned at that instant.
pub struct ProjectionReader {
    store: Arc<dyn LedgerStore>,
}

impl ProjectionReader {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    fn tab_of(ledger: &GigLedger) -> GigTab {
        if ledger.gig.status.is_terminal() {
            return GigTab::History;
        }
        let awaiting_review = ledger
            .milestones
            .iter()
            .any(|m| m.status == MilestoneStatus::Submitted);
        if awaiting_review {
            GigTab::PendingRelease
        } else {
            GigTab::Active
        }
    }

    /// Gigs where `user` holds `role`, filtered by tab, newest activity
    /// first.
    pub async fn gigs_for_user(
        &self,
        user: UserId,
        role: Role,
        tab: GigTab,
    ) -> Result<Vec<GigLedger>> {
        let mut gigs: Vec<GigLedger> = self
            .store
            .all_gigs()
            .await?
            .into_iter()
            .filter(|g| match role {
                Role::Employer => g.gig.employer == user,
                Role::Worker => g.gig.worker == Some(user),
            })
            .filter(|g| Self::tab_of(g) == tab)
            .collect();
        gigs.sort_by(|a, b| b.gig.updated_at.cmp(&a.gig.updated_at));
        Ok(gigs)
    }

    /// Money totals for a user in one role. Payment sums only count
    /// payments paid to the user, so an employer's numbers reflect
    /// refunds, not worker releases.
    pub async fn summary(&self, user: UserId, role: Role) -> Result<SummaryStats> {
        let mut stats = SummaryStats::default();

        for ledger in self.store.all_gigs().await? {
            let involved = match role {
                Role::Employer => ledger.gig.employer == user,
                Role::Worker => ledger.gig.worker == Some(user),
            };
            if !involved {
                continue;
            }

            for payment in &ledger.payments {
                if payment.payee != user {
                    continue;
                }
                match payment.status {
                    PaymentStatus::Released => {
                        stats.total_released = stats.total_released.saturating_add(payment.amount);
                        stats.total_earnings = stats.total_earnings.saturating_add(payment.amount);
                    }
                    PaymentStatus::Withdrawn => {
                        stats.total_earnings = stats.total_earnings.saturating_add(payment.amount);
                    }
                    _ => {}
                }
            }

            stats.total_locked = stats.total_locked.saturating_add(ledger.escrow.locked_amount);
            if !ledger.gig.status.is_terminal() {
                stats.active_gigs += 1;
            }
            for milestone in &ledger.milestones {
                if milestone.status == MilestoneStatus::Submitted {
                    stats.pending_release = stats.pending_release.saturating_add(milestone.amount);
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{MarketConfig, MarketCoordinator};
    use gigfi_escrow::MilestoneSpec;
    use gigfi_ledger::MemoryLedger;
    use gigfi_types::GigId;

    const EMPLOYER: UserId = UserId::new(1);
    const WORKER: UserId = UserId::new(2);

    async fn assigned_gig(market: &MarketCoordinator, tokens: u64) -> GigId {
        let gig_id = market
            .post_gig(
                EMPLOYER,
                "Data pipeline",
                Amount::from_tokens(tokens),
                vec![MilestoneSpec {
                    description: "All".into(),
                    amount: Amount::from_tokens(tokens),
                    payment_percentage: 100,
                }],
            )
            .await
            .unwrap();
        market
            .deposit_escrow(gig_id, EMPLOYER, Amount::from_tokens(tokens))
            .await
            .unwrap();
        market.assign_worker(gig_id, EMPLOYER, WORKER).await.unwrap();
        gig_id
    }

    #[tokio::test]
    async fn test_tabs_track_gig_activity() {
        let store = Arc::new(MemoryLedger::new());
        let market = MarketCoordinator::new(store.clone(), MarketConfig::default());
        let reader = ProjectionReader::new(store.clone());

        let gig_id = assigned_gig(&market, 300).await;
        let active = reader
            .gigs_for_user(WORKER, Role::Worker, GigTab::Active)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let milestone_id = store.gig(gig_id).await.unwrap().next_milestone().unwrap().id;
        market
            .submit_milestone(milestone_id, WORKER, None, None)
            .await
            .unwrap();
        let pending = reader
            .gigs_for_user(WORKER, Role::Worker, GigTab::PendingRelease)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(reader
            .gigs_for_user(WORKER, Role::Worker, GigTab::Active)
            .await
            .unwrap()
            .is_empty());

        market
            .review_milestone(milestone_id, EMPLOYER, true, None)
            .await
            .unwrap();
        let history = reader
            .gigs_for_user(WORKER, Role::Worker, GigTab::History)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        // Employer sees the same gig from their side
        let history = reader
            .gigs_for_user(EMPLOYER, Role::Employer, GigTab::History)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_summary_totals() {
        let store = Arc::new(MemoryLedger::new());
        let market = MarketCoordinator::new(store.clone(), MarketConfig::default());
        let reader = ProjectionReader::new(store.clone());

        // One finished gig, one still locked
        let done = assigned_gig(&market, 300).await;
        let milestone_id = store.gig(done).await.unwrap().next_milestone().unwrap().id;
        market
            .submit_milestone(milestone_id, WORKER, None, None)
            .await
            .unwrap();
        let outcome = market
            .review_milestone(milestone_id, EMPLOYER, true, None)
            .await
            .unwrap();
        assigned_gig(&market, 500).await;

        let stats = reader.summary(WORKER, Role::Worker).await.unwrap();
        assert_eq!(stats.total_earnings, Amount::from_tokens(300));
        assert_eq!(stats.total_released, Amount::from_tokens(300));
        assert_eq!(stats.total_locked, Amount::from_tokens(500));
        assert_eq!(stats.active_gigs, 1);
        assert_eq!(stats.pending_release, Amount::ZERO);

        // The employer side sees the same locked money but none of the
        // worker's earnings
        let stats = reader.summary(EMPLOYER, Role::Employer).await.unwrap();
        assert_eq!(stats.total_earnings, Amount::ZERO);
        assert_eq!(stats.total_locked, Amount::from_tokens(500));

        // Withdrawal moves money out of the releasable bucket but not
        // out of lifetime earnings
        market
            .withdraw_payment(outcome.payment_id.unwrap(), WORKER, "wallet-1")
            .await
            .unwrap();
        let stats = reader.summary(WORKER, Role::Worker).await.unwrap();
        assert_eq!(stats.total_earnings, Amount::from_tokens(300));
        assert_eq!(stats.total_released, Amount::ZERO);
    }
}
