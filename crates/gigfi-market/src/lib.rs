//! Top-level market surface.
//!
//! [`MarketCoordinator`] is the only write path: it routes commands to
//! the escrow, milestone and financing engines, retries version
//! conflicts, and emits [`gigfi_types::DomainEvent`]s after each
//! successful commit. [`ProjectionReader`] serves the read side.

pub mod coordinator;
pub mod projection;

pub use coordinator::{MarketConfig, MarketCoordinator};
pub use projection::{GigTab, ProjectionReader, SummaryStats};
