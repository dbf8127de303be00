//! Chain data provider interface.
//!
//! Every chain read and transaction submission of a session goes through
//! [`ChainDataProvider`]. Submissions return a [`TransactionHandle`] that
//! resolves once the transaction is mined (or fails).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::core::bond::{BondId, BondRawRecord, Stats};
use crate::core::protocol::{ProtocolRawState, VaultApys};
use crate::core::token::{AccountId, Balances, Spender, Token};
use crate::error::{Error, Result};
use crate::utils::constants::MAX_INT256_BE;
use crate::utils::math::Decimal;

// ═══════════════════════════════════════════════════════════════════════════════
// ALLOWANCES
// ═══════════════════════════════════════════════════════════════════════════════

/// ERC-20 allowance of a spender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Allowance {
    /// At or above `MaxInt256`
    Unlimited,
    /// Finite allowance in token units
    Amount(Decimal),
}

impl Allowance {
    /// Decode a big-endian uint256 wad word
    ///
    /// Words at or above `MaxInt256` are unlimited. Finite words that do not
    /// fit a `u128` wad cannot be represented and are reported as overflow.
    pub fn from_be_bytes(word: &[u8; 32]) -> Result<Self> {
        if word >= &MAX_INT256_BE {
            return Ok(Allowance::Unlimited);
        }
        if word[..16].iter().any(|byte| *byte != 0) {
            return Err(Error::overflow("allowance word exceeds u128"));
        }

        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(Allowance::Amount(Decimal::from_wad(u128::from_be_bytes(low))?))
    }

    /// Check if the allowance lets the spender pull `amount`
    pub fn covers(&self, amount: Decimal) -> bool {
        match self {
            Allowance::Unlimited => true,
            Allowance::Amount(allowed) => *allowed >= amount,
        }
    }

    /// Check if the allowance is unlimited
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Allowance::Unlimited)
    }
}

/// Amount requested in an approval transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalAmount {
    /// Approve `MaxUint256`
    Unlimited,
    /// Approve an exact amount
    Exact(Decimal),
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted by a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// Allowance updated
    Approval {
        /// Token
        token: Token,
        /// Spender
        spender: Spender,
    },
    /// Bond created
    BondCreated {
        /// New bond id
        bond_id: BondId,
        /// LUSD locked
        deposit: Decimal,
    },
    /// Bond cancelled, deposit refunded
    BondCancelled {
        /// Bond id
        bond_id: BondId,
        /// LUSD returned
        refund: Decimal,
    },
    /// Bond claimed, accrued bLUSD minted
    BondClaimed {
        /// Bond id
        bond_id: BondId,
        /// bLUSD minted
        minted: Decimal,
    },
    /// AMM swap executed
    Swapped {
        /// Token sold
        input_token: Token,
        /// Amount sold
        input_amount: Decimal,
        /// Amount received
        output_amount: Decimal,
    },
    /// LP position changed (add, remove, stake, unstake or reward claim)
    LiquidityChanged {
        /// LP tokens held after the change
        lp_token: Decimal,
        /// LP tokens staked after the change
        staked_lp_token: Decimal,
    },
}

/// Receipt of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Transaction hash
    pub hash: String,
    /// Timestamp of the including block
    pub block_timestamp: u64,
    /// Event of interest emitted by the transaction
    pub event: Option<ChainEvent>,
}

/// Outcome delivered to a waiting [`TransactionHandle`]
pub type TransactionOutcome = std::result::Result<TransactionReceipt, String>;

/// Handle of a submitted transaction
#[derive(Debug)]
pub struct TransactionHandle {
    /// Transaction hash
    pub hash: String,
    action: String,
    receipt: oneshot::Receiver<TransactionOutcome>,
}

impl TransactionHandle {
    /// Create a handle resolved through `receipt`
    pub fn new(
        hash: impl Into<String>,
        action: impl Into<String>,
        receipt: oneshot::Receiver<TransactionOutcome>,
    ) -> Self {
        Self {
            hash: hash.into(),
            action: action.into(),
            receipt,
        }
    }

    /// Create a handle that is already resolved
    pub fn resolved(hash: impl Into<String>, action: impl Into<String>, outcome: TransactionOutcome) -> Self {
        let (tx, rx) = oneshot::channel();
        // The receiver is alive, so the send cannot fail
        let _ = tx.send(outcome);
        Self::new(hash, action, rx)
    }

    /// Wait for the transaction to be mined
    pub async fn wait(self) -> Result<TransactionReceipt> {
        match self.receipt.await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(reason)) => Err(Error::TransactionFailure {
                action: self.action,
                reason,
            }),
            Err(_) => Err(Error::TransactionFailure {
                action: self.action,
                reason: "transaction dropped before confirmation".into(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROVIDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of chain data and sink of transactions
///
/// Submissions are signed by the provider's own account.
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Check if the network and the signer are available
    async fn is_connected(&self) -> bool;

    /// Raw protocol state
    async fn get_protocol_snapshot(&self) -> Result<ProtocolRawState>;

    /// Bonds owned by an account, in creation order
    async fn get_bonds_for_account(&self, account: &AccountId) -> Result<Vec<BondRawRecord>>;

    /// Protocol-wide bond counters
    async fn get_stats(&self) -> Result<Stats>;

    /// Token balances of an account
    async fn get_balances(&self, account: &AccountId) -> Result<Balances>;

    /// Allowance of `spender` over `owner`'s `token`
    async fn get_allowance(&self, owner: &AccountId, spender: Spender, token: Token) -> Result<Allowance>;

    /// Output of selling `amount` of `input` in the bLUSD/LUSD pool
    async fn quote_swap(&self, input: Token, amount: Decimal) -> Result<Decimal>;

    /// Yields of the treasury venues
    async fn get_vault_apys(&self) -> Result<VaultApys>;

    /// Approve a spender
    async fn submit_approval(&self, token: Token, spender: Spender, amount: ApprovalAmount) -> Result<TransactionHandle>;

    /// Lock `amount` LUSD in a new bond
    async fn submit_create_bond(&self, amount: Decimal) -> Result<TransactionHandle>;

    /// Cancel a bond, refunding at least `min_return` LUSD
    async fn submit_cancel_bond(&self, bond_id: &BondId, min_return: Decimal) -> Result<TransactionHandle>;

    /// Claim a bond's accrued bLUSD
    async fn submit_claim_bond(&self, bond_id: &BondId) -> Result<TransactionHandle>;

    /// Sell `amount` of `input` for at least `min_output` of its counterpart
    async fn submit_swap(&self, input: Token, amount: Decimal, min_output: Decimal) -> Result<TransactionHandle>;

    /// Add liquidity, optionally staking the LP tokens
    async fn submit_add_liquidity(
        &self,
        blusd_amount: Decimal,
        lusd_amount: Decimal,
        min_lp_tokens: Decimal,
        stake: bool,
    ) -> Result<TransactionHandle>;

    /// Burn LP tokens for both pool tokens
    async fn submit_remove_liquidity(
        &self,
        burn_lp_tokens: Decimal,
        min_blusd: Decimal,
        min_lusd: Decimal,
    ) -> Result<TransactionHandle>;

    /// Burn LP tokens for a single pool token
    async fn submit_remove_liquidity_one_coin(
        &self,
        burn_lp_tokens: Decimal,
        output: Token,
        min_amount: Decimal,
    ) -> Result<TransactionHandle>;

    /// Stake LP tokens in the gauge
    async fn submit_stake_liquidity(&self, lp_tokens: Decimal) -> Result<TransactionHandle>;

    /// Unstake LP tokens from the gauge
    async fn submit_unstake_liquidity(&self, lp_tokens: Decimal) -> Result<TransactionHandle>;

    /// Claim gauge rewards
    async fn submit_claim_lp_rewards(&self) -> Result<TransactionHandle>;
}
