//! Tokens, spenders and account balances the bond flows touch.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::math::Decimal;

/// Account (wallet address) the session acts for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ERC-20 tokens handled by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Token {
    /// LUSD stablecoin
    Lusd,
    /// bLUSD bond token
    BLusd,
    /// bLUSD/LUSD AMM liquidity token
    BLusdLusdLp,
}

impl Token {
    /// Ticker symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Lusd => "LUSD",
            Token::BLusd => "bLUSD",
            Token::BLusdLusdLp => "bLUSD-LUSD LP",
        }
    }

    /// The other side of a bLUSD/LUSD swap
    pub fn swap_counterpart(&self) -> Option<Token> {
        match self {
            Token::Lusd => Some(Token::BLusd),
            Token::BLusd => Some(Token::Lusd),
            Token::BLusdLusdLp => None,
        }
    }

    /// Contract that must be approved to sell this token in a swap
    pub fn swap_spender(&self) -> Option<Spender> {
        match self {
            Token::BLusd => Some(Spender::BLusdAmm),
            // LUSD enters the pool through the zapper
            Token::Lusd => Some(Spender::BLusdAmmZapper),
            Token::BLusdLusdLp => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Contracts that pull tokens from the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Spender {
    /// Chicken bond manager (bond creation)
    ChickenBondManager,
    /// bLUSD AMM pool
    BLusdAmm,
    /// Zapper adding/removing liquidity and swapping LUSD
    BLusdAmmZapper,
    /// LP staking gauge
    BLusdLpGauge,
}

/// A (token, spender) allowance the session cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalKey {
    /// Token being spent
    pub token: Token,
    /// Spending contract
    pub spender: Spender,
}

impl ApprovalKey {
    /// Create a key
    pub const fn new(token: Token, spender: Spender) -> Self {
        Self { token, spender }
    }

    /// LUSD to the bond manager, required before creating bonds
    pub const BOND_CREATION: Self = Self::new(Token::Lusd, Spender::ChickenBondManager);

    /// Every allowance the bond, swap and liquidity flows depend on
    pub fn all() -> [ApprovalKey; 6] {
        [
            Self::BOND_CREATION,
            Self::new(Token::BLusd, Spender::BLusdAmm),
            Self::new(Token::Lusd, Spender::BLusdAmmZapper),
            Self::new(Token::BLusd, Spender::BLusdAmmZapper),
            Self::new(Token::BLusdLusdLp, Spender::BLusdAmmZapper),
            Self::new(Token::BLusdLusdLp, Spender::BLusdLpGauge),
        ]
    }
}

/// Token balances of the session account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// LUSD balance
    pub lusd: Decimal,
    /// bLUSD balance
    pub blusd: Decimal,
    /// Unstaked LP tokens
    pub lp_token: Decimal,
    /// LP tokens staked in the gauge
    pub staked_lp_token: Decimal,
    /// Unclaimed gauge rewards
    pub lp_rewards: Decimal,
}

impl Balances {
    /// Balance of a token held in the wallet
    pub fn of(&self, token: Token) -> Decimal {
        match token {
            Token::Lusd => self.lusd,
            Token::BLusd => self.blusd,
            Token::BLusdLusdLp => self.lp_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_counterpart() {
        assert_eq!(Token::Lusd.swap_counterpart(), Some(Token::BLusd));
        assert_eq!(Token::BLusd.swap_counterpart(), Some(Token::Lusd));
        assert_eq!(Token::BLusdLusdLp.swap_counterpart(), None);
    }

    #[test]
    fn test_swap_spender() {
        assert_eq!(Token::BLusd.swap_spender(), Some(Spender::BLusdAmm));
        assert_eq!(Token::Lusd.swap_spender(), Some(Spender::BLusdAmmZapper));
    }

    #[test]
    fn test_approval_keys_unique() {
        let mut keys = ApprovalKey::all().to_vec();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ApprovalKey::all().len());
    }

    #[test]
    fn test_balances_of() {
        let balances = Balances {
            lusd: Decimal::from_int(10),
            blusd: Decimal::from_int(2),
            ..Default::default()
        };
        assert_eq!(balances.of(Token::Lusd), Decimal::from_int(10));
        assert_eq!(balances.of(Token::BLusdLusdLp), Decimal::ZERO);
    }
}
