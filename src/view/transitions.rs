//! Views, events and the static transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::bond::BondId;
use crate::core::token::{ApprovalKey, Token};
use crate::error::Result;
use crate::utils::math::Decimal;

// ═══════════════════════════════════════════════════════════════════════════════
// VIEWS
// ═══════════════════════════════════════════════════════════════════════════════

/// Screen of the bond flow the user is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BondView {
    /// Bond list
    #[default]
    Idle,
    /// Configuring a new bond
    Creating,
    /// Confirming a cancellation
    Cancelling,
    /// Confirming a claim
    Claiming,
    /// Configuring a bLUSD/LUSD swap
    Swapping,
    /// Adding, removing or staking liquidity
    ManagingLiquidity,
}

impl fmt::Display for BondView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event tag, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Open the create view
    CreateBondPressed,
    /// Open the cancel view
    CancelPressed,
    /// Open the claim view
    ClaimPressed,
    /// Open the swap view
    SwapPressed,
    /// Open the liquidity view
    ManageLiquidityPressed,
    /// Leave the current action view
    BackPressed,
    /// Submit an approval
    ApprovePressed,
    /// Submit the view's main transaction
    ConfirmPressed,
    /// Flip the swap direction
    ChangePressed,
    /// Bond creation mined
    CreateBondConfirmed,
    /// Bond cancellation mined
    CancelBondConfirmed,
    /// Bond claim mined
    ClaimBondConfirmed,
    /// Swap mined
    SwapConfirmed,
    /// Liquidity operation mined
    ManageLiquidityConfirmed,
}

impl EventKind {
    /// Check if the event runs a transaction handler
    pub fn is_action(&self) -> bool {
        matches!(self, EventKind::ApprovePressed | EventKind::ConfirmPressed)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Liquidity operation confirmed in the liquidity view
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityAction {
    /// Deposit both tokens, optionally staking the LP tokens
    Add {
        blusd_amount: Decimal,
        lusd_amount: Decimal,
        min_lp_tokens: Decimal,
        stake: bool,
    },
    /// Burn LP tokens for both tokens
    Remove {
        burn_lp_tokens: Decimal,
        min_blusd: Decimal,
        min_lusd: Decimal,
    },
    /// Burn LP tokens for one token
    RemoveOneCoin {
        burn_lp_tokens: Decimal,
        output: Token,
        min_amount: Decimal,
    },
    /// Stake LP tokens in the gauge
    Stake { lp_tokens: Decimal },
    /// Unstake LP tokens from the gauge
    Unstake { lp_tokens: Decimal },
    /// Claim gauge rewards
    ClaimRewards,
}

impl LiquidityAction {
    /// Amounts that must be strictly positive
    ///
    /// Fails when the two sides of an add cannot be summed.
    pub(crate) fn positive_amounts(&self) -> Result<Vec<Decimal>> {
        let amounts = match self {
            LiquidityAction::Add {
                blusd_amount,
                lusd_amount,
                ..
            } => {
                // One side may be empty, not both
                vec![blusd_amount.try_add(*lusd_amount)?]
            }
            LiquidityAction::Remove { burn_lp_tokens, .. }
            | LiquidityAction::RemoveOneCoin { burn_lp_tokens, .. } => vec![*burn_lp_tokens],
            LiquidityAction::Stake { lp_tokens } | LiquidityAction::Unstake { lp_tokens } => {
                vec![*lp_tokens]
            }
            LiquidityAction::ClaimRewards => Vec::new(),
        };
        Ok(amounts)
    }

    /// Amounts that must not be negative
    pub(crate) fn non_negative_amounts(&self) -> Vec<Decimal> {
        match self {
            LiquidityAction::Add {
                blusd_amount,
                lusd_amount,
                min_lp_tokens,
                ..
            } => vec![*blusd_amount, *lusd_amount, *min_lp_tokens],
            LiquidityAction::Remove {
                min_blusd, min_lusd, ..
            } => vec![*min_blusd, *min_lusd],
            LiquidityAction::RemoveOneCoin { min_amount, .. } => vec![*min_amount],
            _ => Vec::new(),
        }
    }
}

/// Payload of `ConfirmPressed`
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmPayload {
    /// Create a bond with this LUSD deposit
    CreateBond { deposit: Decimal },
    /// Cancel the selected bond
    CancelBond { min_return: Decimal },
    /// Claim the selected bond
    ClaimBond,
    /// Sell `amount` of the selected input token
    Swap { amount: Decimal, min_output: Decimal },
    /// Liquidity operation
    Liquidity(LiquidityAction),
}

/// Event dispatched to the bond view machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum BondEvent {
    CreateBondPressed,
    CancelPressed { bond_id: BondId },
    ClaimPressed { bond_id: BondId },
    SwapPressed { input_token: Token },
    ManageLiquidityPressed,
    BackPressed,
    /// Approve a spender; `None` selects the approval the view depends on
    ApprovePressed { key: Option<ApprovalKey> },
    ConfirmPressed(ConfirmPayload),
    /// Flip the swap direction
    ChangePressed,
    CreateBondConfirmed,
    CancelBondConfirmed,
    ClaimBondConfirmed,
    SwapConfirmed,
    ManageLiquidityConfirmed,
}

impl BondEvent {
    /// Tag of the event
    pub fn kind(&self) -> EventKind {
        match self {
            BondEvent::CreateBondPressed => EventKind::CreateBondPressed,
            BondEvent::CancelPressed { .. } => EventKind::CancelPressed,
            BondEvent::ClaimPressed { .. } => EventKind::ClaimPressed,
            BondEvent::SwapPressed { .. } => EventKind::SwapPressed,
            BondEvent::ManageLiquidityPressed => EventKind::ManageLiquidityPressed,
            BondEvent::BackPressed => EventKind::BackPressed,
            BondEvent::ApprovePressed { .. } => EventKind::ApprovePressed,
            BondEvent::ConfirmPressed(_) => EventKind::ConfirmPressed,
            BondEvent::ChangePressed => EventKind::ChangePressed,
            BondEvent::CreateBondConfirmed => EventKind::CreateBondConfirmed,
            BondEvent::CancelBondConfirmed => EventKind::CancelBondConfirmed,
            BondEvent::ClaimBondConfirmed => EventKind::ClaimBondConfirmed,
            BondEvent::SwapConfirmed => EventKind::SwapConfirmed,
            BondEvent::ManageLiquidityConfirmed => EventKind::ManageLiquidityConfirmed,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSITION TABLE
// ═══════════════════════════════════════════════════════════════════════════════

use BondView::*;
use EventKind::*;

/// Every admissible `(view, event)` pair and the view it leads to
pub static TRANSITIONS: &[(BondView, EventKind, BondView)] = &[
    (Idle, CreateBondPressed, Creating),
    (Idle, CancelPressed, Cancelling),
    (Idle, ClaimPressed, Claiming),
    (Idle, SwapPressed, Swapping),
    (Idle, ManageLiquidityPressed, ManagingLiquidity),
    (Creating, BackPressed, Idle),
    (Creating, ApprovePressed, Creating),
    (Creating, ConfirmPressed, Creating),
    (Creating, CreateBondConfirmed, Idle),
    (Cancelling, BackPressed, Idle),
    (Cancelling, ConfirmPressed, Cancelling),
    (Cancelling, CancelBondConfirmed, Idle),
    (Claiming, BackPressed, Idle),
    (Claiming, ConfirmPressed, Claiming),
    (Claiming, ClaimBondConfirmed, Idle),
    (Swapping, BackPressed, Idle),
    (Swapping, ChangePressed, Swapping),
    (Swapping, ApprovePressed, Swapping),
    (Swapping, ConfirmPressed, Swapping),
    (Swapping, SwapConfirmed, Idle),
    (ManagingLiquidity, BackPressed, Idle),
    (ManagingLiquidity, ApprovePressed, ManagingLiquidity),
    (ManagingLiquidity, ConfirmPressed, ManagingLiquidity),
    (ManagingLiquidity, ManageLiquidityConfirmed, Idle),
];

/// View reached by `event` from `view`, or `None` if the pair is not admissible
pub fn next_view(view: BondView, event: EventKind) -> Option<BondView> {
    TRANSITIONS
        .iter()
        .find(|(from, kind, _)| *from == view && *kind == event)
        .map(|(_, _, to)| *to)
}

/// Events admissible in `view`, in table order
pub fn valid_events(view: BondView) -> Vec<EventKind> {
    TRANSITIONS
        .iter()
        .filter(|(from, _, _)| *from == view)
        .map(|(_, kind, _)| *kind)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_no_duplicate_pairs() {
        for (i, (view, event, _)) in TRANSITIONS.iter().enumerate() {
            let duplicates = TRANSITIONS[i + 1..]
                .iter()
                .filter(|(v, e, _)| v == view && e == event)
                .count();
            assert_eq!(duplicates, 0, "duplicate entry for ({}, {})", view, event);
        }
    }

    #[test]
    fn test_back_leads_to_idle_from_every_action_view() {
        for view in [Creating, Cancelling, Claiming, Swapping, ManagingLiquidity] {
            assert_eq!(next_view(view, BackPressed), Some(Idle));
        }
        assert_eq!(next_view(Idle, BackPressed), None);
    }

    #[test]
    fn test_confirmations_only_from_their_view() {
        assert_eq!(next_view(Creating, CreateBondConfirmed), Some(Idle));
        assert_eq!(next_view(Idle, CreateBondConfirmed), None);
        assert_eq!(next_view(Claiming, CancelBondConfirmed), None);
        assert_eq!(next_view(Swapping, SwapConfirmed), Some(Idle));
    }

    #[test]
    fn test_valid_events() {
        assert_eq!(
            valid_events(Idle),
            vec![CreateBondPressed, CancelPressed, ClaimPressed, SwapPressed, ManageLiquidityPressed]
        );
        assert_eq!(valid_events(Claiming), vec![BackPressed, ConfirmPressed, ClaimBondConfirmed]);
        assert!(valid_events(Swapping).contains(&ChangePressed));
    }

    #[test]
    fn test_event_kind() {
        let event = BondEvent::ConfirmPressed(ConfirmPayload::ClaimBond);
        assert_eq!(event.kind(), ConfirmPressed);
        assert!(event.kind().is_action());
        assert!(!BondEvent::BackPressed.kind().is_action());
    }
}
