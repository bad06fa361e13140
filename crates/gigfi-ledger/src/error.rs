use gigfi_types::{CollateralId, GigId, MarketError};
use thiserror::Error;

/// Storage-layer errors. Engines convert these into the shared
/// `MarketError` taxonomy at the boundary.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict on gig {gig_id}: expected {expected}, actual {actual}")]
    VersionConflict {
        gig_id: GigId,
        expected: u64,
        actual: u64,
    },

    #[error(
        "Version conflict on collateral {collateral_id}: expected {expected}, actual {actual}"
    )]
    CollateralConflict {
        collateral_id: CollateralId,
        expected: u64,
        actual: u64,
    },

    /// A commit would violate a ledger invariant; the commit is rejected
    /// and the stored state stays at the previous version.
    #[error("Ledger corrupted for gig {gig_id}: {detail}")]
    Corrupted { gig_id: GigId, detail: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<LedgerError> for MarketError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(what) => MarketError::NotFound(what),
            LedgerError::VersionConflict {
                gig_id,
                expected,
                actual,
            } => MarketError::Conflict(format!(
                "gig {} version {} is stale (stored {})",
                gig_id, expected, actual
            )),
            LedgerError::CollateralConflict {
                collateral_id,
                expected,
                actual,
            } => MarketError::Conflict(format!(
                "collateral {} version {} is stale (stored {})",
                collateral_id, expected, actual
            )),
            other => MarketError::System(other.to_string()),
        }
    }
}
