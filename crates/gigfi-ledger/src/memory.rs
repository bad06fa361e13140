use crate::error::{LedgerError, Result};
use crate::records::{CollateralRecord, GigLedger, RatingRecord};
use crate::store::LedgerStore;
use async_trait::async_trait;
use gigfi_types::{CollateralId, GigId, LoanId, MilestoneId, PaymentId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// In-memory reference backend.
///
/// The single source of truth from process start; there is no separate
/// mock code path. Lock order is always gigs → collateral → indices so
/// a commit can touch all tables without deadlocking.
pub struct MemoryLedger {
    gigs: Arc<RwLock<HashMap<GigId, GigLedger>>>,
    collateral: Arc<RwLock<HashMap<CollateralId, CollateralRecord>>>,
    milestone_index: Arc<RwLock<HashMap<MilestoneId, GigId>>>,
    payment_index: Arc<RwLock<HashMap<PaymentId, GigId>>>,
    loan_index: Arc<RwLock<HashMap<LoanId, GigId>>>,
    ratings: Arc<RwLock<Vec<RatingRecord>>>,
    next_id: AtomicU64,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            gigs: Arc::new(RwLock::new(HashMap::new())),
            collateral: Arc::new(RwLock::new(HashMap::new())),
            milestone_index: Arc::new(RwLock::new(HashMap::new())),
            payment_index: Arc::new(RwLock::new(HashMap::new())),
            loan_index: Arc::new(RwLock::new(HashMap::new())),
            ratings: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn create_gig(&self, ledger: GigLedger) -> Result<()> {
        if let Err(detail) = ledger.verify() {
            return Err(LedgerError::Corrupted {
                gig_id: ledger.gig.id,
                detail,
            });
        }

        let gig_id = ledger.gig.id;
        let mut gigs = self.gigs.write().await;
        if gigs.contains_key(&gig_id) {
            return Err(LedgerError::Backend(anyhow::anyhow!(
                "gig {} already exists",
                gig_id
            )));
        }

        let mut milestone_index = self.milestone_index.write().await;
        for m in &ledger.milestones {
            milestone_index.insert(m.id, gig_id);
        }

        info!(
            gig_id = %gig_id,
            employer = %ledger.gig.employer,
            payment = %ledger.gig.payment_amount,
            milestones = ledger.milestones.len(),
            storage_type = "memory",
            "💾 Gig ledger created"
        );
        gigs.insert(gig_id, ledger);
        Ok(())
    }

    async fn gig(&self, id: GigId) -> Result<GigLedger> {
        let gigs = self.gigs.read().await;
        gigs.get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("gig {}", id)))
    }

    async fn commit_gig(
        &self,
        mut ledger: GigLedger,
        collateral_updates: Vec<CollateralRecord>,
    ) -> Result<()> {
        let gig_id = ledger.gig.id;

        let mut gigs = self.gigs.write().await;
        let stored = gigs
            .get(&gig_id)
            .ok_or_else(|| LedgerError::NotFound(format!("gig {}", gig_id)))?;

        if stored.version != ledger.version {
            warn!(
                gig_id = %gig_id,
                snapshot_version = ledger.version,
                stored_version = stored.version,
                "⚠️ Stale commit rejected"
            );
            return Err(LedgerError::VersionConflict {
                gig_id,
                expected: ledger.version,
                actual: stored.version,
            });
        }

        if let Err(detail) = ledger.verify() {
            warn!(gig_id = %gig_id, detail = %detail, "⚠️ Invariant-violating commit rejected");
            return Err(LedgerError::Corrupted { gig_id, detail });
        }

        // Validate collateral math before anything is written
        for update in &collateral_updates {
            if update.locked_amount > update.asset_value {
                return Err(LedgerError::Corrupted {
                    gig_id,
                    detail: format!(
                        "collateral {} locked {} > value {}",
                        update.id, update.locked_amount, update.asset_value
                    ),
                });
            }
        }

        let mut collateral = self.collateral.write().await;

        // Collateral is shared across gigs, so each record carries its
        // own version; a snapshot taken before another gig's commit
        // moved the lock must not overwrite it
        for update in &collateral_updates {
            if let Some(stored) = collateral.get(&update.id) {
                if stored.version != update.version {
                    warn!(
                        collateral_id = %update.id,
                        snapshot_version = update.version,
                        stored_version = stored.version,
                        "⚠️ Stale collateral commit rejected"
                    );
                    return Err(LedgerError::CollateralConflict {
                        collateral_id: update.id,
                        expected: update.version,
                        actual: stored.version,
                    });
                }
            }
        }

        let mut payment_index = self.payment_index.write().await;
        let mut loan_index = self.loan_index.write().await;

        for mut update in collateral_updates {
            update.version += 1;
            debug!(
                collateral_id = %update.id,
                locked = %update.locked_amount,
                version = update.version,
                "Collateral updated in gig commit"
            );
            collateral.insert(update.id, update);
        }
        for p in &ledger.payments {
            payment_index.entry(p.id).or_insert(gig_id);
        }
        for l in &ledger.loans {
            loan_index.entry(l.id).or_insert(gig_id);
        }

        ledger.version += 1;
        info!(
            gig_id = %gig_id,
            version = ledger.version,
            locked = %ledger.escrow.locked_amount,
            released = %ledger.escrow.released_amount,
            withdrawn = %ledger.escrow.withdrawn_amount,
            storage_type = "memory",
            "💾 Gig ledger committed"
        );
        gigs.insert(gig_id, ledger);
        Ok(())
    }

    async fn all_gigs(&self) -> Result<Vec<GigLedger>> {
        let gigs = self.gigs.read().await;
        Ok(gigs.values().cloned().collect())
    }

    async fn gig_id_for_milestone(&self, id: MilestoneId) -> Result<GigId> {
        let index = self.milestone_index.read().await;
        index
            .get(&id)
            .copied()
            .ok_or_else(|| LedgerError::NotFound(format!("milestone {}", id)))
    }

    async fn gig_id_for_payment(&self, id: PaymentId) -> Result<GigId> {
        let index = self.payment_index.read().await;
        index
            .get(&id)
            .copied()
            .ok_or_else(|| LedgerError::NotFound(format!("payment {}", id)))
    }

    async fn gig_id_for_loan(&self, id: LoanId) -> Result<GigId> {
        let index = self.loan_index.read().await;
        index
            .get(&id)
            .copied()
            .ok_or_else(|| LedgerError::NotFound(format!("loan {}", id)))
    }

    async fn create_collateral(&self, record: CollateralRecord) -> Result<()> {
        let mut collateral = self.collateral.write().await;
        info!(
            collateral_id = %record.id,
            owner = %record.owner,
            kind = ?record.kind,
            value = %record.asset_value,
            "💾 Collateral asset registered"
        );
        collateral.insert(record.id, record);
        Ok(())
    }

    async fn collateral(&self, id: CollateralId) -> Result<CollateralRecord> {
        let collateral = self.collateral.read().await;
        collateral
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("collateral {}", id)))
    }

    async fn record_rating(&self, rating: RatingRecord) -> Result<()> {
        let mut ratings = self.ratings.write().await;
        ratings.push(rating);
        Ok(())
    }

    async fn ratings_for(&self, worker: UserId) -> Result<Vec<RatingRecord>> {
        let ratings = self.ratings.read().await;
        Ok(ratings
            .iter()
            .filter(|r| r.worker == worker)
            .cloned()
            .collect())
    }
}
