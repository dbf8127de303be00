//! Per-category transaction status.
//!
//! Each action category has its own status, so independent transactions
//! (a swap approval and a stake approval, say) can be in flight together
//! while a second transaction of the same category is refused.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::view::transitions::{BondView, EventKind};

/// Class of transaction a handler submits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionCategory {
    /// LUSD approval to the bond manager
    Approve,
    /// Bond creation
    Create,
    /// Bond cancellation
    Cancel,
    /// Bond claim
    Claim,
    /// Approval of the swap input token to the AMM or zapper
    ApproveAmm,
    /// Approval for a liquidity operation
    ApproveSpender,
    /// Swap
    Swap,
    /// Add/remove/stake/unstake liquidity or claim rewards
    ManageLiquidity,
}

impl ActionCategory {
    /// All categories
    pub const ALL: [ActionCategory; 8] = [
        ActionCategory::Approve,
        ActionCategory::Create,
        ActionCategory::Cancel,
        ActionCategory::Claim,
        ActionCategory::ApproveAmm,
        ActionCategory::ApproveSpender,
        ActionCategory::Swap,
        ActionCategory::ManageLiquidity,
    ];

    /// Categories whose handlers run in `view`
    pub fn for_view(view: BondView) -> &'static [ActionCategory] {
        match view {
            BondView::Idle => &[],
            BondView::Creating => &[ActionCategory::Approve, ActionCategory::Create],
            BondView::Cancelling => &[ActionCategory::Cancel],
            BondView::Claiming => &[ActionCategory::Claim],
            BondView::Swapping => &[ActionCategory::ApproveAmm, ActionCategory::Swap],
            BondView::ManagingLiquidity => &[ActionCategory::ApproveSpender, ActionCategory::ManageLiquidity],
        }
    }

    /// Category of the approval handler of `view`
    pub fn approval_for(view: BondView) -> Option<ActionCategory> {
        match view {
            BondView::Creating => Some(ActionCategory::Approve),
            BondView::Swapping => Some(ActionCategory::ApproveAmm),
            BondView::ManagingLiquidity => Some(ActionCategory::ApproveSpender),
            _ => None,
        }
    }

    /// Confirmation event redispatched after a terminal action succeeds
    pub fn confirmation_event(&self) -> Option<EventKind> {
        match self {
            ActionCategory::Create => Some(EventKind::CreateBondConfirmed),
            ActionCategory::Cancel => Some(EventKind::CancelBondConfirmed),
            ActionCategory::Claim => Some(EventKind::ClaimBondConfirmed),
            ActionCategory::Swap => Some(EventKind::SwapConfirmed),
            ActionCategory::ManageLiquidity => Some(EventKind::ManageLiquidityConfirmed),
            ActionCategory::Approve | ActionCategory::ApproveAmm | ActionCategory::ApproveSpender => None,
        }
    }

    /// Label used in logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            ActionCategory::Approve => "approve",
            ActionCategory::Create => "create",
            ActionCategory::Cancel => "cancel",
            ActionCategory::Claim => "claim",
            ActionCategory::ApproveAmm => "approve AMM",
            ActionCategory::ApproveSpender => "approve spender",
            ActionCategory::Swap => "swap",
            ActionCategory::ManageLiquidity => "manage liquidity",
        }
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a category's latest transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Nothing submitted
    #[default]
    Idle,
    /// Submitted, not mined yet
    Pending,
    /// Mined
    Confirmed,
    /// Rejected or reverted
    Failed,
}

/// Status of every action category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBoard {
    statuses: [TransactionStatus; 8],
}

impl StatusBoard {
    fn index(category: ActionCategory) -> usize {
        category as usize
    }

    /// Status of a category
    pub fn get(&self, category: ActionCategory) -> TransactionStatus {
        self.statuses[Self::index(category)]
    }

    /// Set the status of a category
    pub fn set(&mut self, category: ActionCategory, status: TransactionStatus) {
        self.statuses[Self::index(category)] = status;
    }

    /// Check if a category has a transaction in flight
    pub fn is_pending(&self, category: ActionCategory) -> bool {
        self.get(category) == TransactionStatus::Pending
    }

    /// First pending category among `categories`
    pub fn first_pending(&self, categories: &[ActionCategory]) -> Option<ActionCategory> {
        categories.iter().copied().find(|c| self.is_pending(*c))
    }

    /// Reset the non-pending categories among `categories` to `Idle`
    pub fn reset_settled(&mut self, categories: &[ActionCategory]) {
        for category in categories {
            if !self.is_pending(*category) {
                self.set(*category, TransactionStatus::Idle);
            }
        }
    }

    /// `(category, status)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (ActionCategory, TransactionStatus)> + '_ {
        ActionCategory::ALL.iter().map(move |c| (*c, self.get(*c)))
    }
}
