use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies one gig and its ledger row set.
    GigId
);
entity_id!(
    /// Identifies a milestone within a gig (globally unique).
    MilestoneId
);
entity_id!(
    /// Identifies an immutable escrow-release payment record.
    PaymentId
);
entity_id!(
    /// Identifies an advance-financing loan.
    LoanId
);
entity_id!(
    /// Identifies a collateral asset (endorsement or reputation stake).
    CollateralId
);
entity_id!(
    /// Verified platform user, supplied by the external identity layer.
    UserId
);

/// Which side of a gig a user acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employer,
    Worker,
}
