//! Fixed-point arithmetic and mathematical utilities.
//!
//! All protocol economics are computed with [`Decimal`], a checked
//! fixed-point number truncated to 18 fractional digits, the same scale the
//! contracts use for their wad amounts. Operations that can leave the domain
//! return [`Result`] instead of producing silent infinities.

use std::fmt;
use std::str::FromStr;

use num_traits::ToPrimitive;
use rust_decimal::{Decimal as RawDecimal, MathematicalOps, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::{SECONDS_PER_DAY, WAD_DECIMALS};

// ═══════════════════════════════════════════════════════════════════════════════
// DECIMAL TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-point number with 18 decimal places precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimal(RawDecimal);

impl Decimal {
    /// Zero value
    pub const ZERO: Self = Self(RawDecimal::ZERO);

    /// One (1.0)
    pub const ONE: Self = Self(RawDecimal::ONE);

    /// Create from a mantissa and a decimal scale (`new(15, 1)` is 1.5)
    ///
    /// Panics if `scale` exceeds 28, like [`rust_decimal::Decimal::new`].
    pub fn new(num: i64, scale: u32) -> Self {
        Self::from_raw(RawDecimal::new(num, scale))
    }

    /// Create from an integer
    pub fn from_int(value: i64) -> Self {
        Self(RawDecimal::from(value))
    }

    /// Wrap a raw decimal, truncating to 18 fractional digits
    pub fn from_raw(raw: RawDecimal) -> Self {
        Self(raw.round_dp_with_strategy(WAD_DECIMALS, RoundingStrategy::ToZero))
    }

    /// Create from an on-chain wad (integer scaled by 10^18)
    pub fn from_wad(wad: u128) -> Result<Self> {
        let signed = i128::try_from(wad).map_err(|_| Error::overflow("from_wad"))?;
        RawDecimal::try_from_i128_with_scale(signed, WAD_DECIMALS)
            .map(Self)
            .map_err(|_| Error::overflow("from_wad"))
    }

    /// Convert to an on-chain wad, truncating below 10^-18
    pub fn to_wad(&self) -> Result<u128> {
        if self.is_negative() {
            return Err(Error::InvalidState(format!("negative amount {} has no wad form", self)));
        }
        let scaled = self
            .0
            .checked_mul(RawDecimal::from(10u64.pow(WAD_DECIMALS)))
            .ok_or_else(|| Error::overflow("to_wad"))?;
        scaled.trunc().to_u128().ok_or_else(|| Error::overflow("to_wad"))
    }

    /// Convert a duration in seconds to days
    pub fn days_from_seconds(seconds: u64) -> Self {
        Self::from_raw(RawDecimal::from(seconds) / RawDecimal::from(SECONDS_PER_DAY))
    }

    /// Get the underlying raw decimal
    pub fn raw(&self) -> RawDecimal {
        self.0
    }

    /// Whole seconds represented by a value in days, truncated
    pub fn days_to_seconds(&self) -> Result<u64> {
        if self.is_negative() {
            return Err(Error::InvalidState(format!("negative duration {} days", self)));
        }
        self.0
            .checked_mul(RawDecimal::from(SECONDS_PER_DAY))
            .and_then(|s| s.trunc().to_u64())
            .ok_or_else(|| Error::overflow("days_to_seconds"))
    }

    /// Check if value is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if value is strictly below zero
    pub fn is_negative(&self) -> bool {
        self.0 < RawDecimal::ZERO
    }

    /// Check if value is strictly above zero
    pub fn is_positive(&self) -> bool {
        self.0 > RawDecimal::ZERO
    }

    /// Negative values become zero
    pub fn clamp_non_negative(self) -> Self {
        if self.is_negative() {
            Self::ZERO
        } else {
            self
        }
    }

    /// Checked addition
    pub fn try_add(self, rhs: Self) -> Result<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Self::from_raw)
            .ok_or_else(|| Error::overflow(format!("{} + {}", self, rhs)))
    }

    /// Checked subtraction
    pub fn try_sub(self, rhs: Self) -> Result<Self> {
        self.0
            .checked_sub(rhs.0)
            .map(Self::from_raw)
            .ok_or_else(|| Error::overflow(format!("{} - {}", self, rhs)))
    }

    /// Checked multiplication, truncated to 18 digits
    pub fn try_mul(self, rhs: Self) -> Result<Self> {
        self.0
            .checked_mul(rhs.0)
            .map(Self::from_raw)
            .ok_or_else(|| Error::overflow(format!("{} * {}", self, rhs)))
    }

    /// Checked division, truncated to 18 digits
    pub fn try_div(self, rhs: Self) -> Result<Self> {
        if rhs.is_zero() {
            return Err(Error::division_by_zero(format!("{} / 0", self)));
        }
        self.0
            .checked_div(rhs.0)
            .map(Self::from_raw)
            .ok_or_else(|| Error::overflow(format!("{} / {}", self, rhs)))
    }

    /// Square root
    pub fn try_sqrt(self) -> Result<Self> {
        if self.is_negative() {
            return Err(Error::InvalidState(format!("square root of negative {}", self)));
        }
        self.0
            .sqrt()
            .map(Self::from_raw)
            .ok_or_else(|| Error::NotComputable(format!("sqrt({})", self)))
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Self(RawDecimal::from(value))
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RawDecimal::from_str(s.trim())
            .map(Self::from_raw)
            .map_err(|e| Error::InvalidParameter {
                name: "decimal".into(),
                reason: format!("{:?}: {}", s, e),
            })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.normalize(), f)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERIOD
// ═══════════════════════════════════════════════════════════════════════════════

/// A time horizon in days that may never be reached
///
/// `Infinite` is a first-class value: the break-even or rebond point does not
/// exist under the current premium. It orders above every finite period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    /// Reached after the given number of days
    Finite(Decimal),
    /// Never reached
    Infinite,
}

impl Period {
    /// Zero-length period
    pub const ZERO: Self = Period::Finite(Decimal::ZERO);

    /// Check if the period is finite
    pub fn is_finite(&self) -> bool {
        matches!(self, Period::Finite(_))
    }

    /// Days, if finite
    pub fn days(&self) -> Option<Decimal> {
        match self {
            Period::Finite(days) => Some(*days),
            Period::Infinite => None,
        }
    }

    /// Days, or `NotComputable` naming `what`
    pub fn finite_days(&self, what: &str) -> Result<Decimal> {
        self.days()
            .ok_or_else(|| Error::NotComputable(format!("{} is infinite", what)))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Finite(days) => write!(f, "{} days", days),
            Period::Infinite => write!(f, "never"),
        }
    }
}
