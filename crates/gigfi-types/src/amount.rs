use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOKEN_DECIMALS: u32 = 6;
pub const TOKEN_BASE_UNIT: u64 = 1_000_000; // 10^6

/// Ledger money amount in fixed-point base units.
///
/// All escrow and loan arithmetic happens in integer base units so the
/// balance invariants are exact; there is no floating point anywhere on
/// the invariant-bearing paths.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_tokens(tokens: u64) -> Self {
        Self(tokens * TOKEN_BASE_UNIT)
    }

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn min(&self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Multiply by a basis-point factor, rounding down.
    ///
    /// Used for interest (`total_due = principal + principal.mul_bps(rate)`),
    /// borrowing caps, and collateral ratios. Widens to u128 internally so
    /// the intermediate product cannot overflow.
    pub fn mul_bps(&self, bps: u32) -> Self {
        Self((self.0 as u128 * bps as u128 / 10_000) as u64)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}",
            self.0 / TOKEN_BASE_UNIT,
            self.0 % TOKEN_BASE_UNIT
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        let a = Amount::from_tokens(1000);
        let b = Amount::from_tokens(400);

        assert_eq!(a.checked_sub(b).unwrap(), Amount::from_tokens(600));
        assert_eq!(b.checked_add(b).unwrap(), Amount::from_tokens(800));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(a.saturating_sub(a), Amount::ZERO);
    }

    #[test]
    fn test_mul_bps() {
        let principal = Amount::from_tokens(1000);

        // 80% borrowing cap
        assert_eq!(principal.mul_bps(8_000), Amount::from_tokens(800));
        // 6% reputation interest
        assert_eq!(principal.mul_bps(600), Amount::from_tokens(60));
        // 0% escrow-backed interest
        assert_eq!(principal.mul_bps(0), Amount::ZERO);
    }

    #[test]
    fn test_mul_bps_no_overflow() {
        let large = Amount::from_base_units(u64::MAX / 2);
        // Would overflow u64 without the u128 widening
        let capped = large.mul_bps(10_000);
        assert_eq!(capped, large);
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_tokens(1000).to_string(), "1000.000000");
        assert_eq!(Amount::from_base_units(1_500_000).to_string(), "1.500000");
        assert_eq!(Amount::ZERO.to_string(), "0.000000");
    }
}
