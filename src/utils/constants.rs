//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// NUMERIC CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fractional digits of on-chain wad amounts
pub const WAD_DECIMALS: u32 = 18;

/// Seconds per day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Days per year used for annualized rates
pub const DAYS_PER_YEAR: i64 = 365;

/// Smallest uint256 treated as an unlimited allowance (MaxInt256 = 2^255 - 1),
/// big-endian
pub const MAX_INT256_BE: [u8; 32] = {
    let mut bytes = [0xff; 32];
    bytes[0] = 0x7f;
    bytes
};

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Interval between periodic refreshes
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15;

/// Interval between allowance polls of a watched (token, spender) pair
pub const DEFAULT_APPROVAL_POLL_SECS: u64 = 15;

/// How long fetched vault APYs stay fresh
pub const DEFAULT_APY_CACHE_TTL_SECS: u64 = 600;

/// bLUSD amount sold in the marginal quote when no AMM oracle price exists,
/// as (mantissa, scale): 0.001
pub const MARGINAL_QUOTE_INPUT: (i64, u32) = (1, 3);

/// Identifier shown for a bond whose creation is not yet confirmed
pub const OPTIMISTIC_BOND_ID: &str = "pending";
