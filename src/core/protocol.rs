//! Protocol-wide economics: raw chain snapshot and the derived `ProtocolInfo`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::math::{Decimal, Period};

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURY
// ═══════════════════════════════════════════════════════════════════════════════

/// LUSD held by the bond manager, split into its three buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    /// Backs the deposits of pending bonds
    pub pending: Decimal,
    /// Backs the bLUSD supply (floor price)
    pub reserve: Decimal,
    /// Protocol-owned, released only on migration
    pub permanent: Decimal,
    /// `pending + reserve + permanent`
    pub total: Decimal,
}

impl Treasury {
    /// Build a treasury; the total is always the exact sum of the buckets
    pub fn new(pending: Decimal, reserve: Decimal, permanent: Decimal) -> Result<Self> {
        let total = pending.try_add(reserve)?.try_add(permanent)?;
        Ok(Self {
            pending,
            reserve,
            permanent,
            total,
        })
    }

    /// Check `total == pending + reserve + permanent`
    pub fn is_consistent(&self) -> bool {
        self.pending
            .try_add(self.reserve)
            .and_then(|sum| sum.try_add(self.permanent))
            .map(|sum| sum == self.total)
            .unwrap_or(false)
    }
}

/// Bounds on the intrinsic value of one bLUSD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairPrice {
    /// Lower bound (reserve backing)
    pub lower: Decimal,
    /// Upper bound (reserve plus permanent backing)
    pub upper: Decimal,
}

impl FairPrice {
    /// Bounds used before any bLUSD exists
    pub const BOOTSTRAP: Self = Self {
        lower: Decimal::ONE,
        upper: Decimal::ONE,
    };
}

/// Annual yields of the venues the treasury is deployed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultApys {
    /// B.Protocol AMM (stability pool) APY
    pub b_amm: Decimal,
    /// Yearn Curve LUSD vault APY
    pub curve: Decimal,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RAW SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw protocol state as read from the contracts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRawState {
    /// bLUSD total supply
    pub bond_token_supply: Decimal,
    /// Pending bucket
    pub pending_lusd: Decimal,
    /// Permanent bucket
    pub permanent_lusd: Decimal,
    /// LUSD owed to the bond manager by the B.AMM
    pub b_amm_lusd_debt: Decimal,
    /// LUSD held through the Yearn Curve vault
    pub curve_sai: Decimal,
    /// Fee fraction applied on chicken-in
    pub chicken_in_fee: Decimal,
    /// Accrual curve parameter in seconds
    pub accrual_parameter_seconds: Decimal,
    /// Controller target for the average pending bond age, in seconds
    pub target_average_age_seconds: Decimal,
    /// Sum over pending bonds of `deposit * start_time`
    pub total_weighted_start_times: Decimal,
    /// Sum of pending bond deposits
    pub total_pending_deposits: Decimal,
    /// bLUSD price from the AMM oracle, when the pool exposes one
    pub amm_oracle_price: Option<Decimal>,
    /// Block timestamp of the snapshot
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Derived protocol economics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    /// bLUSD total supply; zero is the bootstrap state
    pub bond_token_supply: Decimal,
    /// bLUSD price in LUSD
    pub market_price: Decimal,
    /// Treasury buckets
    pub treasury: Treasury,
    /// Redemption value of one bLUSD
    pub floor_price: Decimal,
    /// Fee fraction applied on claim
    pub claim_bond_fee: Decimal,
    /// Accrual curve parameter in days
    pub alpha_accrual_factor: Decimal,
    /// `market_price / floor_price`
    pub market_price_premium: Decimal,
    /// Whether claiming can ever beat cancelling at this premium
    pub has_market_premium: bool,
    /// Days until claiming breaks even
    pub break_even_period_in_days: Period,
    /// Days until rebonding becomes optimal
    pub rebond_period_in_days: Period,
    /// Controller target average bond age in days
    pub controller_target_age: Decimal,
    /// Current average pending bond age in days
    pub average_bond_age: Decimal,
    /// Intrinsic value bounds
    pub fair_price: FairPrice,
    /// What-if price the simulated figures are computed with
    ///
    /// Only differs from `market_price` in a simulated info. The live info
    /// always carries the live price here, even while an override is set;
    /// read the override from the simulated info or the session state.
    pub simulated_market_price: Decimal,
    /// Treasury yield relative to bLUSD market cap, if APYs are known
    pub bond_token_apr: Option<Decimal>,
    /// Block timestamp of the underlying snapshot
    pub snapshot_timestamp: u64,
}

impl ProtocolInfo {
    /// Check if no bLUSD has been minted yet
    pub fn is_bootstrap(&self) -> bool {
        self.bond_token_supply.is_zero()
    }

    /// Check the documented price ordering `floor <= fair.lower <= fair.upper`
    pub fn price_bounds_hold(&self) -> bool {
        self.is_bootstrap()
            || (self.floor_price <= self.fair_price.lower && self.fair_price.lower <= self.fair_price.upper)
    }
}
