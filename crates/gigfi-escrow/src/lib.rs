pub mod engine;
pub mod hook;
pub mod milestone;

pub use engine::{CancelOutcome, EscrowEngine, MilestoneSpec, WithdrawReceipt};
pub use hook::{LoanRepayment, NoopReleaseHook, ReleaseHook, ReleaseOutcome};
pub use milestone::{MilestoneMachine, ReviewOutcome};
