use crate::error::Result;
use crate::records::{CollateralRecord, GigLedger, RatingRecord};
use async_trait::async_trait;
use gigfi_types::{CollateralId, GigId, LoanId, MilestoneId, PaymentId, UserId};

/// Durable, versioned persistence for the gig ledger.
///
/// No business logic lives here. `commit_gig` is the single atomic
/// boundary: the whole per-gig row set plus any collateral updates land
/// in one commit, or the commit is rejected with `VersionConflict` /
/// `Corrupted` and nothing changes.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Allocate a fresh entity id. Ids are unique across entity kinds.
    async fn allocate_id(&self) -> u64;

    /// Insert a new gig row set at version 0.
    async fn create_gig(&self, ledger: GigLedger) -> Result<()>;

    /// Load a snapshot of a gig's row set.
    async fn gig(&self, id: GigId) -> Result<GigLedger>;

    /// Commit a mutated snapshot. Checks the snapshot's version against
    /// the stored one, audits the ledger invariants, applies the
    /// collateral updates, and bumps the version — all atomically.
    async fn commit_gig(
        &self,
        ledger: GigLedger,
        collateral_updates: Vec<CollateralRecord>,
    ) -> Result<()>;

    /// Full scan for the projection layer.
    async fn all_gigs(&self) -> Result<Vec<GigLedger>>;

    async fn gig_id_for_milestone(&self, id: MilestoneId) -> Result<GigId>;
    async fn gig_id_for_payment(&self, id: PaymentId) -> Result<GigId>;
    async fn gig_id_for_loan(&self, id: LoanId) -> Result<GigId>;

    async fn create_collateral(&self, record: CollateralRecord) -> Result<()>;
    async fn collateral(&self, id: CollateralId) -> Result<CollateralRecord>;

    async fn record_rating(&self, rating: RatingRecord) -> Result<()>;
    async fn ratings_for(&self, worker: UserId) -> Result<Vec<RatingRecord>>;
}
