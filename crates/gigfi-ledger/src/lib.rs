pub mod error;
pub mod memory;
pub mod records;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::MemoryLedger;
pub use records::{
    CollateralRecord, EscrowBalance, GigLedger, GigRecord, LoanRecord, MilestoneRecord,
    PaymentRecord, RatingRecord,
};
pub use store::LedgerStore;
