//! Advance financing against escrowed gig payments.
//!
//! Workers can borrow up to a capped share of a funded gig's payment,
//! backed by the escrow itself, an endorsement stake, or reputation.
//! Repayment is not a user action: every escrow release first flows
//! through the repayment waterfall, and only the remainder becomes a
//! withdrawable payment.

pub mod engine;
pub mod policy;

pub use engine::FinancingEngine;
pub use policy::FinancingPolicy;
