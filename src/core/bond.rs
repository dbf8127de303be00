//! Bond positions.
//!
//! A bond locks an LUSD deposit and accrues bLUSD until it is cancelled
//! (deposit refunded) or claimed (accrued bLUSD minted). Status changes are
//! driven by the chain only; this crate recomputes the derived figures from
//! each fresh snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::constants::OPTIMISTIC_BOND_ID;
use crate::utils::math::{Decimal, Period};

// ═══════════════════════════════════════════════════════════════════════════════
// BOND ID & STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol-assigned bond identifier (the bond NFT token id)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BondId(pub String);

impl BondId {
    /// Sentinel id of the optimistic placeholder
    pub fn optimistic() -> Self {
        Self(OPTIMISTIC_BOND_ID.to_string())
    }

    /// Check if this is the optimistic sentinel
    pub fn is_optimistic(&self) -> bool {
        self.0 == OPTIMISTIC_BOND_ID
    }
}

impl From<&str> for BondId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for BondId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain bond status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondStatus {
    /// Unknown to the bond manager
    NonExistent,
    /// Accruing
    Pending,
    /// Deposit refunded (terminal)
    Cancelled,
    /// Accrued bLUSD minted (terminal)
    Claimed,
}

impl BondStatus {
    /// Check if no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, BondStatus::Cancelled | BondStatus::Claimed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOND RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Bond fields as stored on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondRawRecord {
    /// Bond id
    pub id: BondId,
    /// LUSD locked at creation
    pub deposit: Decimal,
    /// bLUSD accrued so far (meaningful only while pending)
    pub accrued: Decimal,
    /// Creation timestamp
    pub start_time: u64,
    /// Cancel/claim timestamp
    pub end_time: Option<u64>,
    /// Status
    pub status: BondStatus,
    /// bLUSD minted on claim
    pub claimed_amount: Option<Decimal>,
}

/// A bond with all derived figures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    /// Bond id
    pub id: BondId,
    /// LUSD locked at creation
    pub deposit: Decimal,
    /// bLUSD accrued; zero once the bond left `Pending`
    pub accrued: Decimal,
    /// Creation timestamp
    pub start_time: u64,
    /// Cancel/claim timestamp
    pub end_time: Option<u64>,
    /// Status
    pub status: BondStatus,
    /// bLUSD minted on claim
    pub claimed_amount: Option<Decimal>,
    /// Age in days at snapshot time (or at the end time)
    pub bond_age_in_days: Decimal,
    /// Accrual at which claiming breaks even, if ever
    pub break_even_accrual: Option<Decimal>,
    /// Accrual at the optimal rebond point, if ever
    pub rebond_accrual: Option<Decimal>,
    /// Estimated break-even timestamp
    pub break_even_time: Option<u64>,
    /// Estimated rebond timestamp
    pub rebond_time: Option<u64>,
    /// `accrued * market_price`
    pub market_value: Decimal,
    /// LUSD profit of claiming and selling now
    pub claim_now_return: Decimal,
    /// LUSD profit of claiming and selling at the rebond point
    pub rebond_return: Option<Decimal>,
    /// Relative return at the rebond point
    pub rebond_roi: Option<Decimal>,
    /// Annualized rebond return
    pub rebond_apr: Option<Decimal>,
    /// Days left until the rebond point
    pub remaining_rebond_days: Period,
    /// Days left until break-even
    pub remaining_break_even_days: Period,
}

/// Locally synthesized placeholder for a submitted, unconfirmed bond creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticBond {
    /// Always the optimistic sentinel
    pub id: BondId,
    /// Requested deposit
    pub deposit: Decimal,
    /// Submission timestamp
    pub start_time: u64,
    /// Always `Pending`
    pub status: BondStatus,
}

impl OptimisticBond {
    /// Create a placeholder for a deposit submitted at `start_time`
    pub fn new(deposit: Decimal, start_time: u64) -> Self {
        Self {
            id: BondId::optimistic(),
            deposit,
            start_time,
            status: BondStatus::Pending,
        }
    }
}

/// Entry of the bond list shown to readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondListing {
    /// Not yet confirmed
    Optimistic(OptimisticBond),
    /// Authoritative bond from the last synchronization
    Confirmed(Bond),
}

impl BondListing {
    /// Bond id
    pub fn id(&self) -> &BondId {
        match self {
            BondListing::Optimistic(bond) => &bond.id,
            BondListing::Confirmed(bond) => &bond.id,
        }
    }

    /// Bond status
    pub fn status(&self) -> BondStatus {
        match self {
            BondListing::Optimistic(bond) => bond.status,
            BondListing::Confirmed(bond) => bond.status,
        }
    }

    /// Deposit
    pub fn deposit(&self) -> Decimal {
        match self {
            BondListing::Optimistic(bond) => bond.deposit,
            BondListing::Confirmed(bond) => bond.deposit,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol-wide bond counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Bonds still accruing
    pub pending_bonds: u64,
    /// Bonds cancelled
    pub cancelled_bonds: u64,
    /// Bonds claimed
    pub claimed_bonds: u64,
    /// All bonds ever created
    pub total_bonds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(BondStatus::Cancelled.is_terminal());
        assert!(BondStatus::Claimed.is_terminal());
        assert!(!BondStatus::Pending.is_terminal());
        assert!(!BondStatus::NonExistent.is_terminal());
    }

    #[test]
    fn test_optimistic_bond() {
        let bond = OptimisticBond::new(Decimal::from_int(500), 1_700_000_000);
        assert!(bond.id.is_optimistic());
        assert_eq!(bond.status, BondStatus::Pending);

        let listing = BondListing::Optimistic(bond);
        assert_eq!(listing.deposit(), Decimal::from_int(500));
        assert_eq!(listing.status(), BondStatus::Pending);
        assert!(!BondId::from("7").is_optimistic());
    }
}
