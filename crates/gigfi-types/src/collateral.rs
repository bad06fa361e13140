use serde::{Deserialize, Serialize};

/// Backing instrument for an advance loan.
///
/// Each variant carries its own interest rate and extra-collateral
/// requirement, so policy lives on the type instead of being scattered
/// over string comparisons at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralKind {
    /// Backed purely by the gig's own locked escrow.
    EscrowBacked,
    /// Escrow plus a partial stake from a collateral asset.
    Mixed,
    /// Backed by a peer endorsement stake.
    Endorsement,
    /// Backed by a reputation stake; requires a minimum rating score.
    Reputation,
}

impl CollateralKind {
    /// Fixed interest table, in basis points of the principal.
    pub fn interest_rate_bps(&self) -> u32 {
        match self {
            Self::EscrowBacked => 0,
            Self::Mixed => 300,
            Self::Endorsement => 400,
            Self::Reputation => 600,
        }
    }

    /// Share of the requested amount that must be locked on the referenced
    /// collateral asset at disbursement, in basis points.
    pub fn required_collateral_ratio_bps(&self) -> u32 {
        match self {
            // The escrow itself is the collateral; nothing extra is locked
            Self::EscrowBacked => 0,
            Self::Mixed => 5_000,
            Self::Endorsement => 10_000,
            Self::Reputation => 10_000,
        }
    }

    /// Whether this kind references a collateral asset record.
    pub fn needs_asset(&self) -> bool {
        !matches!(self, Self::EscrowBacked)
    }
}
