pub mod amount;
pub mod collateral;
pub mod error;
pub mod events;
pub mod ids;
pub mod status;

pub use amount::{Amount, TOKEN_BASE_UNIT, TOKEN_DECIMALS};
pub use collateral::CollateralKind;
pub use error::{MarketError, Result};
pub use events::DomainEvent;
pub use ids::{CollateralId, GigId, LoanId, MilestoneId, PaymentId, Role, UserId};
pub use status::{
    EscrowStatus, GigStatus, LifecycleState, LoanStatus, MilestoneStatus, PaymentStatus,
};
